pub mod localities;
mod registry;

pub use localities::SearchLocalitiesTool;
pub use registry::{
    json_schema_array, json_schema_boolean, json_schema_integer, json_schema_object,
    json_schema_string, Tool, ToolRegistry,
};
