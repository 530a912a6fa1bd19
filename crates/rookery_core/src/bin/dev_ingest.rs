/*
 * SPDX-FileCopyrightText: 2026 Rookery Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use rookery_core::inbox::process_activity;
use rookery_core::remote::RemoteContext;
use rookery_core::social_db::SocialDb;
use std::env;

/// Feeds one activity document (already verified out of band) through the
/// reconciliation engine against a local database.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::DEBUG.into()),
        )
        .init();

    let mut args = env::args().skip(1);
    let (Some(db_path), Some(base_url), Some(activity_path)) = (args.next(), args.next(), args.next()) else {
        anyhow::bail!("usage: dev_ingest <db_path> <public_base_url> <activity.json>");
    };

    let db = SocialDb::open(&db_path)?;
    db.health_check()?;
    let ctx = RemoteContext::new(reqwest::Client::new(), &base_url);
    let raw = std::fs::read(&activity_path)?;
    let activity: serde_json::Value = serde_json::from_slice(&raw)?;

    process_activity(&db, &ctx, &activity).await?;
    println!("ok");
    Ok(())
}
