pub mod descriptor_heap;
pub mod root_signature;
