pub mod buffer;
pub mod handles;
pub mod texture;
pub mod views;
