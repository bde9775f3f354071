pub mod publisher;
pub mod sampler;
