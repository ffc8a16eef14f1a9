pub mod book;
pub mod relationship;

pub use book::Book;
pub use relationship::Role;
