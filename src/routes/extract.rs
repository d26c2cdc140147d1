//! Request extractors whose rejections render as [`ApiError`] JSON.

use axum::extract::{FromRequest, FromRequestParts};

use super::ApiError;

// ---

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);
