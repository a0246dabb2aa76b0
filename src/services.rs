pub mod reconciler;
pub mod sweep;
