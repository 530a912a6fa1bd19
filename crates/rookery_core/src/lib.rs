/*
 * SPDX-FileCopyrightText: 2026 Rookery Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod context;
pub mod exposure;
pub mod inbox;
pub mod remote;
pub mod resolve;
pub mod social_db;
