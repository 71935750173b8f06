mod client;

pub use client::{
    PanClient, PanError, PanErrorClass, PanResource, PanResourceType, TransferLink,
};
