mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use crate::commands::{
    ProductEdit, cmd_export, cmd_import, cmd_plan_choose, cmd_plan_clear, cmd_plan_list,
    cmd_plan_set_count, cmd_plan_show, cmd_plan_unchoose, cmd_product_add, cmd_product_clear,
    cmd_product_delete, cmd_product_edit, cmd_product_list, cmd_recipe_create, cmd_recipe_delete,
    cmd_recipe_edit, cmd_recipe_list, cmd_recipe_show, cmd_section_add, cmd_section_list,
};
use crate::config::Config;
use groceria_core::service::GroceriaService;

#[derive(Parser)]
#[command(
    name = "groceria",
    version,
    about = "Plan meals from your recipes and turn them into a grocery list"
)]
struct Cli {
    /// Act as this user (default: $GROCERIA_USER, then "local")
    #[arg(long, global = true)]
    user: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage store sections (aisles)
    Section {
        #[command(subcommand)]
        command: SectionCommands,
    },
    /// Manage products
    Product {
        #[command(subcommand)]
        command: ProductCommands,
    },
    /// Manage recipes and the products they need
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Choose recipes, tweak counts, and print the grocery list
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Export products, recipes, and relations as a JSON snapshot
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Merge a JSON snapshot into your data, matching by title
    Import {
        /// Path to the snapshot file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum SectionCommands {
    /// List your sections
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add one or more sections. Existing titles are left alone.
    Add {
        /// Section title(s)
        #[arg(required = true)]
        titles: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProductCommands {
    /// List your products and public products
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a product
    Add {
        /// Product title
        title: String,
        /// Section title (created if it does not exist)
        #[arg(short, long)]
        section: Option<String>,
        /// Remind to check stock before buying
        #[arg(long)]
        check_stock: bool,
        /// Make the product visible to every user
        #[arg(long)]
        public: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a product by ID or title
    Edit {
        /// Product ID or title
        product: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New section title (created if it does not exist)
        #[arg(short, long, conflicts_with = "no_section")]
        section: Option<String>,
        /// Remove the product from its section
        #[arg(long)]
        no_section: bool,
        /// Set the check-stock flag (true/false)
        #[arg(long)]
        check_stock: Option<bool>,
        /// Set whether the product is public (true/false)
        #[arg(long)]
        public: Option<bool>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a product by ID or title
    Delete {
        /// Product ID or title
        product: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete all of your own products
    Clear {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// List all recipes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe and its products
    Show {
        /// Recipe ID or title
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a recipe
    Create {
        /// Recipe title
        title: String,
        /// Product ID or title (repeatable)
        #[arg(short, long = "product")]
        products: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rename a recipe or replace its products
    Edit {
        /// Recipe ID or title
        recipe: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// Product ID or title (repeatable, replaces the current list)
        #[arg(short, long = "product")]
        products: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe
    Delete {
        /// Recipe ID or title
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Show chosen recipes and product counts
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Choose one or more recipes
    Choose {
        /// Recipe ID(s) or title(s)
        #[arg(required = true)]
        recipes: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Unchoose a recipe
    Unchoose {
        /// Recipe ID or title
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set how many of a product to buy
    SetCount {
        /// Product ID or title
        product: String,
        /// Quantity
        count: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear all choices and counts
    Clear {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the grocery list as markdown
    List {
        /// Date for the heading (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.user)?;
    let svc = GroceriaService::open(&config.db_path, &config.user)?;

    match cli.command {
        Commands::Section { command } => match command {
            SectionCommands::List { json } => cmd_section_list(&svc, json),
            SectionCommands::Add { titles, json } => cmd_section_add(&svc, &titles, json),
        },
        Commands::Product { command } => match command {
            ProductCommands::List { json } => cmd_product_list(&svc, json),
            ProductCommands::Add {
                title,
                section,
                check_stock,
                public,
                json,
            } => cmd_product_add(&svc, &title, section.as_deref(), check_stock, public, json),
            ProductCommands::Edit {
                product,
                title,
                section,
                no_section,
                check_stock,
                public,
                json,
            } => cmd_product_edit(
                &svc,
                &product,
                ProductEdit {
                    title,
                    section,
                    no_section,
                    check_stock,
                    public,
                },
                json,
            ),
            ProductCommands::Delete { product, json } => cmd_product_delete(&svc, &product, json),
            ProductCommands::Clear { json } => cmd_product_clear(&svc, json),
        },
        Commands::Recipe { command } => match command {
            RecipeCommands::List { json } => cmd_recipe_list(&svc, json),
            RecipeCommands::Show { recipe, json } => cmd_recipe_show(&svc, &recipe, json),
            RecipeCommands::Create {
                title,
                products,
                json,
            } => cmd_recipe_create(&svc, &title, &products, json),
            RecipeCommands::Edit {
                recipe,
                title,
                products,
                json,
            } => cmd_recipe_edit(&svc, &recipe, title, &products, json),
            RecipeCommands::Delete { recipe, json } => cmd_recipe_delete(&svc, &recipe, json),
        },
        Commands::Plan { command } => match command {
            PlanCommands::Show { json } => cmd_plan_show(&svc, json),
            PlanCommands::Choose { recipes, json } => cmd_plan_choose(&svc, &recipes, json),
            PlanCommands::Unchoose { recipe, json } => cmd_plan_unchoose(&svc, &recipe, json),
            PlanCommands::SetCount {
                product,
                count,
                json,
            } => cmd_plan_set_count(&svc, &product, count, json),
            PlanCommands::Clear { json } => cmd_plan_clear(&svc, json),
            PlanCommands::List { date, output, json } => {
                cmd_plan_list(&svc, date, output.as_deref(), json)
            }
        },
        Commands::Export { output } => cmd_export(&svc, output.as_deref()),
        Commands::Import { file, json } => cmd_import(&svc, &file, json),
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?)
            };
            server::start_server(svc, port, &bind, api_key).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_user_flag() {
        let cli = Cli::try_parse_from(["groceria", "plan", "show", "--user", "alice"]).unwrap();
        assert_eq!(cli.user.as_deref(), Some("alice"));
    }

    #[test]
    fn test_recipe_create_repeatable_products() {
        let cli = Cli::try_parse_from([
            "groceria", "recipe", "create", "Pancakes", "-p", "Eggs", "--product", "Milk",
        ])
        .unwrap();
        match cli.command {
            Commands::Recipe {
                command: RecipeCommands::Create { title, products, .. },
            } => {
                assert_eq!(title, "Pancakes");
                assert_eq!(products, vec!["Eggs", "Milk"]);
            }
            _ => panic!("expected recipe create"),
        }
    }

    #[test]
    fn test_product_edit_section_conflicts() {
        let result = Cli::try_parse_from([
            "groceria",
            "product",
            "edit",
            "Milk",
            "--section",
            "Dairy",
            "--no-section",
        ]);
        assert!(result.is_err());
    }
}
