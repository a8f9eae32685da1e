use anyhow::Result;
use tabled::{Table, Tabled, settings::Style};

use groceria_core::service::GroceriaService;

use super::helpers::{print_json, truncate};

pub(crate) fn cmd_section_list(svc: &GroceriaService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct SectionRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Title")]
        title: String,
    }

    let sections = svc.section_get_all()?;
    if json {
        return print_json(&sections);
    }
    if sections.is_empty() {
        eprintln!("No sections yet. Add one with: groceria section add <title>");
        return Ok(());
    }

    let rows: Vec<SectionRow> = sections
        .iter()
        .map(|s| SectionRow {
            id: s.id.clone(),
            title: truncate(&s.title, 40),
        })
        .collect();
    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_section_add(svc: &GroceriaService, titles: &[String], json: bool) -> Result<()> {
    if let [title] = titles {
        let section = svc.section_create(title)?;
        if json {
            return print_json(&section);
        }
        println!("Section: {} (id: {})", section.title, section.id);
        return Ok(());
    }

    let created = svc.section_create_many(titles)?;
    if json {
        print_json(&created)
    } else {
        println!("Created {} section(s)", created.count);
        Ok(())
    }
}
