// Course and library content: trees, backing stores, routing and copies.

pub mod backing;
pub mod copier;
pub mod model;
pub mod olx;
pub mod router;
