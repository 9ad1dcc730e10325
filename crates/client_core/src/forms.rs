//! Schemas of the dashboard's screens.

use shared::protocol::{
    CREATE_INSTANCE_PATH, GET_VS_VALUE_PATH, INSTANCES_PATH, MODULES_PATH, UPLOAD_MODULE_PATH,
};

use crate::schema::{FieldRule, FieldSchema, FormSchema, HttpMethod};

pub const CREATE_INSTANCE: &str = "create_instance";
pub const UPLOAD_MODULE: &str = "upload_module";
pub const GET_VS_VALUE: &str = "get_vs_value";
pub const LIST_MODULES: &str = "list_modules";
pub const SEARCH_MODULES: &str = "search_modules";
pub const LIST_INSTANCES: &str = "list_instances";
pub const SEARCH_INSTANCES: &str = "search_instances";

/// Name of the search-term field on the search screens.
pub const SEARCH_FIELD: &str = "name";

fn github_url() -> FieldSchema {
    FieldSchema::required("github_url", "GitHub URL").with_rule(FieldRule::Url)
}

pub fn create_instance() -> FormSchema {
    FormSchema::new(CREATE_INSTANCE, HttpMethod::Post, CREATE_INSTANCE_PATH)
        .field(FieldSchema::required("instance_name", "Instance name"))
        .field(FieldSchema::required("module_name", "Module name"))
        .field(github_url())
        .field(FieldSchema::required("file_name", "File name"))
        .success_message("Instance created successfully!")
        .fallback_message("Failed to create instance")
        .follow_up("Instances", INSTANCES_PATH)
}

pub fn upload_module() -> FormSchema {
    FormSchema::new(UPLOAD_MODULE, HttpMethod::Post, UPLOAD_MODULE_PATH)
        .field(FieldSchema::required("module_name", "Module name"))
        .field(FieldSchema::required("module_description", "Module description"))
        .field(github_url())
        .field(FieldSchema::required("module_file_name", "Module file name"))
        .field(FieldSchema::required("prediction_file_name", "Prediction file name"))
        .field(FieldSchema::required("requirements_file", "Requirements file"))
        .field(FieldSchema::required(
            "requirements_file_prediction",
            "Requirements file for prediction",
        ))
        .success_message("Module uploaded successfully! You can check its status on the Modules page.")
        .fallback_message("An error occurred while uploading the module.")
        .follow_up("Modules", MODULES_PATH)
}

pub fn get_vs_value() -> FormSchema {
    FormSchema::new(GET_VS_VALUE, HttpMethod::Post, GET_VS_VALUE_PATH)
        .field(FieldSchema::required("instance_name", "Instance name"))
        .field(github_url())
        .field(FieldSchema::required("file_name", "File name"))
        .success_message("Request processed successfully!")
        .fallback_message("An error occurred while processing the request.")
        .follow_up("VS Values", "/vs_values")
}

pub fn list_modules() -> FormSchema {
    FormSchema::new(LIST_MODULES, HttpMethod::Get, MODULES_PATH)
        .fallback_message("Error fetching modules")
}

pub fn search_modules() -> FormSchema {
    FormSchema::new(SEARCH_MODULES, HttpMethod::Get, format!("{MODULES_PATH}/{{{SEARCH_FIELD}}}"))
        .field(FieldSchema::optional(SEARCH_FIELD, "Module name"))
        .fallback_message("Module not found")
}

pub fn list_instances() -> FormSchema {
    FormSchema::new(LIST_INSTANCES, HttpMethod::Get, INSTANCES_PATH)
        .fallback_message("Error fetching instances")
}

pub fn search_instances() -> FormSchema {
    FormSchema::new(
        SEARCH_INSTANCES,
        HttpMethod::Get,
        format!("{INSTANCES_PATH}/{{{SEARCH_FIELD}}}"),
    )
    .field(FieldSchema::optional(SEARCH_FIELD, "Instance name"))
    .fallback_message("Instance not found")
}
