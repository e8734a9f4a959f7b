//! End-to-End Tests for Kura Uploadr
//!
//! These tests run the real HTTP server against a wiremock S3 endpoint and
//! cover:
//!
//! - Presign issuance and rejection envelopes
//! - Server-side uploads
//! - Image listing and counting
//! - Error handling scenarios
//!
//! ## Test Categories
//!
//! - `upload_flow`: presign and server-side upload happy paths
//! - `listing_flow`: listing, pagination and counts
//! - `error_scenarios`: rejections, storage failures, unknown routes

pub mod common;
pub mod error_scenarios;
pub mod listing_flow;
pub mod upload_flow;
