pub mod windows;

pub use windows::WindowsBatch;
