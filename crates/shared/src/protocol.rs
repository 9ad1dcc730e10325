//! Request payloads accepted by the gateway's form endpoints.

use serde::{Deserialize, Serialize};

pub const CREATE_INSTANCE_PATH: &str = "/create_instance";
pub const UPLOAD_MODULE_PATH: &str = "/upload_module";
pub const GET_VS_VALUE_PATH: &str = "/get_vs_value";
pub const MODULES_PATH: &str = "/modules";
pub const INSTANCES_PATH: &str = "/instances";

/// Prefix under which the gateway mirrors every route for same-origin UIs.
pub const API_PREFIX: &str = "/api";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    pub instance_name: String,
    pub module_name: String,
    pub github_url: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadModuleRequest {
    pub module_name: String,
    pub module_description: String,
    pub github_url: String,
    pub module_file_name: String,
    pub prediction_file_name: String,
    pub requirements_file: String,
    pub requirements_file_prediction: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetVsValueRequest {
    pub instance_name: String,
    pub github_url: String,
    pub file_name: String,
}
