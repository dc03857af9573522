pub mod engine;
pub mod extractor;
pub mod fragments;
pub mod memory;
pub mod sessions;
