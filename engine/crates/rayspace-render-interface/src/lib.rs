pub mod frame_counter;
pub mod pipeline_description;
pub mod render_data;
pub mod shader_resources;
