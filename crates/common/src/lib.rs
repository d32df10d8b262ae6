// courier-common: keys, events and wire types shared by the courier crates

pub mod archive;
pub mod events;
pub mod keys;
pub mod slug;
pub mod types;
