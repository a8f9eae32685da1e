mod exchange;
mod helpers;
mod plan;
mod product;
mod recipe;
mod section;

pub(crate) use exchange::{cmd_export, cmd_import};
pub(crate) use plan::{
    cmd_plan_choose, cmd_plan_clear, cmd_plan_list, cmd_plan_set_count, cmd_plan_show,
    cmd_plan_unchoose,
};
pub(crate) use product::{
    ProductEdit, cmd_product_add, cmd_product_clear, cmd_product_delete, cmd_product_edit,
    cmd_product_list,
};
pub(crate) use recipe::{
    cmd_recipe_create, cmd_recipe_delete, cmd_recipe_edit, cmd_recipe_list, cmd_recipe_show,
};
pub(crate) use section::{cmd_section_add, cmd_section_list};
