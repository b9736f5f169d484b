//! Sprite Stack Core
//!
//! Core types shared by the Sprite Stack controller and node agent.
//!
//! This crate contains:
//! - Domain types: scheduled jobs, reservations, compute nodes, dispatch outcomes
//! - DTOs: request/response bodies for the upstream queue and the node agent

pub mod domain;
pub mod dto;
