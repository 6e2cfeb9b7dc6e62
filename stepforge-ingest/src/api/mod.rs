// HTTP API handlers

pub mod assets;
pub mod documents;
pub mod health;
pub mod process;

pub use assets::asset_routes;
pub use documents::document_routes;
pub use health::health_routes;
pub use process::process_routes;
