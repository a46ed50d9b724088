pub mod batch;
pub mod billboard;

pub use batch::{BatchLayout, BillboardSortBatch, DrawRange, DrawRequest, SortedIndices};
pub use billboard::BillboardMode;
