pub mod contract;
pub mod pipeline;
