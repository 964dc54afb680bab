/// Image conversion module
///
/// This module handles:
/// - Validating uploads (content type, size, grid bounds)
/// - Parsing palette overrides
/// - Quantizing an image into an indexed pixel matrix

pub mod quantizer;
pub mod upload;
