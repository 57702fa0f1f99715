pub mod apply;
pub mod tx;
pub mod validation;
