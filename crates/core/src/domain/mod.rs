pub mod order;
pub mod product;
pub mod quote;
pub mod submission;
pub mod sync;
pub mod user;
