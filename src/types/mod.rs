//! Type definitions

pub mod audit;
pub mod company;
pub mod import;
pub mod messages;
pub mod product;
pub mod quote;
pub mod stats;
pub mod supplier;
pub mod user;

pub use audit::*;
pub use company::*;
pub use import::*;
pub use messages::*;
pub use product::*;
pub use quote::*;
pub use stats::*;
pub use supplier::*;
pub use user::*;
