// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Serves the Guardian dashboard.

use std::net::IpAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use guardian_dashboard::http::Credentials;
use guardian_dashboard::layout::{Layout, SchemaName};
use guardian_dashboard::now::SYSTEM_TIME;
use guardian_dashboard::upload::S3ObjectStore;
use guardian_dashboard::Config;
use guardian_warehouse::{QualifiedName, SnowflakeClient, SnowflakeConfig};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use url::Url;

#[derive(Parser, Debug)]
#[clap(name = "guardian-dashboard", next_line_help = true)]
struct Args {
    // === Listener options. ===
    /// The address on which to listen for HTTP connections.
    #[clap(long, env = "LISTEN_ADDR", default_value = "0.0.0.0")]
    listen_addr: IpAddr,
    /// The port on which to listen for HTTP connections.
    #[clap(long, env = "PORT", default_value_t = 3000)]
    port: u16,
    /// The directory holding the frontend's static files.
    #[clap(long, env = "STATIC_DIR", default_value = "public")]
    static_dir: PathBuf,

    // === Snowflake options. ===
    /// The Snowflake account identifier, e.g. `xy12345.us-east-1`.
    #[clap(long, env = "SNOWFLAKE_ACCOUNT")]
    snowflake_account: String,
    #[clap(long, env = "SNOWFLAKE_USERNAME")]
    snowflake_username: String,
    #[clap(long, env = "SNOWFLAKE_PASSWORD", hide_env_values = true)]
    snowflake_password: String,
    /// The warehouse the session starts in.
    #[clap(long, env = "SNOWFLAKE_WAREHOUSE")]
    snowflake_warehouse: Option<String>,
    /// The database the session starts in.
    #[clap(long, env = "SNOWFLAKE_DATABASE")]
    snowflake_database: Option<String>,
    /// The schema the session starts in.
    #[clap(long, env = "SNOWFLAKE_SCHEMA")]
    snowflake_schema: Option<String>,
    /// The role the session starts with.
    #[clap(long, env = "SNOWFLAKE_ROLE")]
    snowflake_role: Option<String>,
    /// Overrides the account URL derived from the account identifier.
    #[clap(long, env = "SNOWFLAKE_URL")]
    snowflake_url: Option<Url>,

    // === S3 options. ===
    /// The bucket that uploaded files land in.
    #[clap(long, env = "S3_BUCKET")]
    s3_bucket: String,
    /// The bucket's region. Defaults to the AWS SDK's region resolution.
    #[clap(long, env = "AWS_REGION")]
    aws_region: Option<String>,

    // === Dashboard options. ===
    #[clap(long, env = "ADMIN_EMAIL", default_value = Credentials::DEFAULT_EMAIL)]
    admin_email: String,
    #[clap(
        long,
        env = "ADMIN_PASSWORD",
        hide_env_values = true,
        default_value = Credentials::DEFAULT_PASSWORD
    )]
    admin_password: String,
    /// The schema holding the landing stages, pipes, streams and materialized
    /// views.
    #[clap(long, env = "INGEST_SCHEMA", default_value = Layout::DEFAULT_INGEST_SCHEMA)]
    ingest_schema: SchemaName,
    /// The schema holding the dimension and fact tables.
    #[clap(long, env = "FACT_SCHEMA", default_value = Layout::DEFAULT_FACT_SCHEMA)]
    fact_schema: SchemaName,
    /// The pipe refreshed by the refresh button.
    #[clap(long, env = "REFRESH_PIPE", default_value = Layout::DEFAULT_REFRESH_PIPE)]
    refresh_pipe: QualifiedName,
    /// The table whose row count is reported after a refresh.
    #[clap(long, env = "ROWCOUNT_TABLE", default_value = Layout::DEFAULT_ROWCOUNT_TABLE)]
    rowcount_table: QualifiedName,
    /// The resource monitor whose credit usage is reported.
    #[clap(long, env = "RESOURCE_MONITOR", default_value = Layout::DEFAULT_RESOURCE_MONITOR)]
    resource_monitor: String,
    /// The tasks shown on the tasks page.
    #[clap(
        long,
        env = "MONITORED_TASKS",
        value_delimiter = ',',
        default_value = Layout::DEFAULT_MONITORED_TASKS
    )]
    monitored_tasks: Vec<String>,
    /// Rejects requests to the routes that run caller-supplied SQL.
    #[clap(long, env = "DISABLE_RAW_SQL")]
    disable_raw_sql: bool,

    // === Logging options. ===
    /// Which log messages to emit, in `EnvFilter` directive syntax.
    #[clap(long, env = "GUARDIAN_LOG_FILTER", default_value = "info")]
    log_filter: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("guardian-dashboard: fatal: {:#}", err);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), anyhow::Error> {
    guardian_dashboard::logging::configure(&args.log_filter)
        .context("configuring logging")?;

    let client = SnowflakeClient::new(SnowflakeConfig {
        account: args.snowflake_account,
        user: args.snowflake_username,
        password: args.snowflake_password,
        warehouse: args.snowflake_warehouse,
        database: args.snowflake_database,
        schema: args.snowflake_schema,
        role: args.snowflake_role,
        base_url: args.snowflake_url,
    })
    .context("configuring Snowflake client")?;
    // Keep serving without a session. Every warehouse-backed route then fails
    // until the process is restarted with working credentials.
    match client.connect().await {
        Ok(()) => info!("connected to Snowflake"),
        Err(e) => error!("unable to connect to Snowflake: {e}"),
    }

    let object_store = S3ObjectStore::new(args.s3_bucket, args.aws_region).await;

    if args.disable_raw_sql {
        info!("raw SQL routes are disabled");
    } else {
        warn!("raw SQL routes are enabled; they run arbitrary SQL as the session role");
    }

    let config = Config {
        warehouse: Arc::new(client),
        object_store: Arc::new(object_store),
        layout: Layout {
            ingest_schema: args.ingest_schema,
            fact_schema: args.fact_schema,
            refresh_pipe: args.refresh_pipe,
            rowcount_table: args.rowcount_table,
            resource_monitor: args.resource_monitor,
            monitored_tasks: args.monitored_tasks,
        },
        credentials: Credentials {
            email: args.admin_email,
            password: args.admin_password,
        },
        raw_sql_enabled: !args.disable_raw_sql,
        static_dir: args.static_dir,
        now: SYSTEM_TIME.clone(),
    };

    let listener = TcpListener::bind((args.listen_addr, args.port))
        .await
        .with_context(|| format!("binding to {}:{}", args.listen_addr, args.port))?;
    info!("listening on http://{}", listener.local_addr()?);

    guardian_dashboard::serve(listener, config, shutdown_signal())
        .await
        .context("serving HTTP")?;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("unable to listen for shutdown signal: {e}");
        // Never resolve, so the server keeps running.
        std::future::pending::<()>().await;
    }
}
