//! services/api/src/bin/openapi.rs
//!
//! Writes the REST API's OpenAPI 3.0 specification to disk, for clients that
//! generate bindings without running the server.

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());
    std::fs::write(&path, ApiDoc::openapi().to_pretty_json()?)?;
    println!("OpenAPI specification written to {path}");
    Ok(())
}
