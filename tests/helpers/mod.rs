#![allow(dead_code)]

pub mod builders;
pub mod db;

pub use builders::{editor, save, system_actor, AccountBuilder, OpportunityBuilder, UserBuilder};
pub use db::TestDb;
