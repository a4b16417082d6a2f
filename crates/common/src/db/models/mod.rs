//! SeaORM entity models
//!
//! Database entities for CiteTree

mod publication;

pub use publication::{
    Entity as PublicationEntity,
    ActiveModel as PublicationActiveModel,
    Column as PublicationColumn,
};
