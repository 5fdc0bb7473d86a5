pub mod acceleration;
pub mod blas_generator;
pub mod in_buffer_allocator;
pub mod sbt;
pub mod tlas_generator;
