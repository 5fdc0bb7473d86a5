pub mod pipeline_desc;
pub mod shader;
