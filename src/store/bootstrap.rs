use sqlx::PgPool;

use crate::auth::token;
use crate::config::{AuthMode, Config};

struct ControlDef {
    order_no: i32,
    title: &'static str,
    description: &'static str,
}

/// "Reporting serious incidents" section of the compliance tracker.
///
/// Only the controls are seeded. The subcontrol titles of this section are
/// dropped because the `subcontrols` table has no title or description columns.
const CONTROL_CATALOG: &[ControlDef] = &[
    ControlDef {
        order_no: 1,
        title: "Unexpected Impact Integration",
        description: "Report any serious incidents involving AI systems to relevant market \
                      surveillance authorities within specified timeframes.",
    },
    ControlDef {
        order_no: 2,
        title: "AI Model Capability Assessment",
        description: "Conduct comprehensive assessments of AI model capabilities using \
                      appropriate tools.",
    },
    ControlDef {
        order_no: 3,
        title: "Post-Deployment Incident Monitoring",
        description: "Monitor incidents related to AI systems and respond post-deployment.",
    },
    ControlDef {
        order_no: 4,
        title: "AI System Logging Implementation",
        description: "Ensure providers implement systems for capturing and storing AI \
                      system logs.",
    },
    ControlDef {
        order_no: 5,
        title: "Serious Incident Immediate Reporting",
        description: "Immediately report serious incidents to providers, importers, \
                      distributors, and authorities.",
    },
];

#[tracing::instrument(skip(pool, cfg), err)]
pub async fn run(pool: &PgPool, cfg: &Config) -> anyhow::Result<()> {
    if cfg.seed_controls {
        seed_controls(pool).await?;
    }
    seed_api_token(pool, cfg).await?;
    Ok(())
}

async fn seed_controls(pool: &PgPool) -> anyhow::Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM controls")
        .fetch_one(pool)
        .await?;

    if count > 0 {
        tracing::info!("control seeding skipped, controls already exist");
        return Ok(());
    }

    for def in CONTROL_CATALOG {
        sqlx::query("INSERT INTO controls (order_no, title, description) VALUES ($1, $2, $3)")
            .bind(def.order_no)
            .bind(def.title)
            .bind(def.description)
            .execute(pool)
            .await?;
    }

    tracing::info!(count = CONTROL_CATALOG.len(), "controls seeded");
    Ok(())
}

async fn seed_api_token(pool: &PgPool, cfg: &Config) -> anyhow::Result<()> {
    if let Some(raw) = cfg.admin_token.as_deref() {
        sqlx::query(
            "INSERT INTO api_tokens (name, token_hash) VALUES ('admin', $1)
             ON CONFLICT (token_hash) DO NOTHING",
        )
        .bind(token::hash_token(raw))
        .execute(pool)
        .await?;
        tracing::info!("admin api token registered");
        return Ok(());
    }

    if cfg.auth_mode == AuthMode::Disabled {
        tracing::warn!("authentication is disabled; all API routes are open");
        return Ok(());
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_tokens")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }

    let (raw, hash) = token::generate_api_token();
    sqlx::query("INSERT INTO api_tokens (name, token_hash) VALUES ('admin', $1)")
        .bind(&hash)
        .execute(pool)
        .await?;
    // Shown once; only the hash is stored.
    tracing::warn!(token = %raw, "generated admin api token");
    Ok(())
}
