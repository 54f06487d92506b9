pub mod parallel;
pub mod testing;

pub use parallel::ExecutionConfig;
