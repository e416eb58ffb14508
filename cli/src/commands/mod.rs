mod food;
mod glucose;
mod helpers;
mod meal;
mod profile;
mod taxonomy;
mod thresholds;

pub(crate) use food::{cmd_food_add, cmd_food_delete, cmd_food_list, cmd_food_show};
pub(crate) use glucose::{
    cmd_glucose_check, cmd_glucose_delete, cmd_glucose_list, cmd_glucose_log,
};
pub(crate) use meal::{
    cmd_meal_add_item, cmd_meal_create, cmd_meal_delete, cmd_meal_list, cmd_meal_remove_item,
    cmd_meal_show,
};
pub(crate) use profile::{cmd_profile_set, cmd_profile_show};
pub(crate) use taxonomy::{
    cmd_taxonomy_filter, cmd_taxonomy_multi, cmd_taxonomy_of, cmd_taxonomy_stats,
};
pub(crate) use thresholds::{
    cmd_config_refresh, cmd_config_reminders, cmd_config_set, cmd_config_show,
};
