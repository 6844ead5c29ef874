use crate::server::{Server, ServerParams};
use anyhow::{anyhow, bail, Result};
use clap::Parser;
use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};
use tracing::info;

#[derive(Debug, Parser)]
#[clap(
    name = "admission-webhook",
    about = "Validates Services and Ingresses admitted to a cluster"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "admission_webhook=info,warn",
        env = "ADMISSION_WEBHOOK_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    /// Port on which HTTPS is served.
    #[clap(long, default_value = "443")]
    port: u16,

    /// PEM-encoded certificate chain presented to the API server.
    #[clap(
        long,
        alias = "tlsCertPath",
        default_value = "/etc/webhook/certs/cert.pem"
    )]
    tls_cert_path: PathBuf,

    /// PEM-encoded private key for the certificate.
    #[clap(long, alias = "tlsKeyPath", default_value = "/etc/webhook/certs/key.pem")]
    tls_key_path: PathBuf,

    /// Policy document, re-read for every validating request.
    #[clap(
        long,
        alias = "cfgFile",
        default_value = "/etc/webhook/config/config.yaml"
    )]
    cfg_file: PathBuf,

    /// How long open connections may take to finish once shutdown begins.
    #[clap(long, default_value = "10000")]
    shutdown_grace_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            port,
            tls_cert_path,
            tls_key_path,
            cfg_file,
            shutdown_grace_ms,
        } = self;

        log_format
            .try_init(log_level)
            .map_err(|error| anyhow!("failed to initialize logging: {error}"))?;

        let (shutdown, watch) = kubert::shutdown::sigint_or_sigterm()?;

        let server = Server::shared(ServerParams {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            cert_file: tls_cert_path,
            key_file: tls_key_path,
            config_file: cfg_file,
            shutdown_grace: Duration::from_millis(shutdown_grace_ms),
        })
        .await?;
        info!(addr = %server.addr(), "Starting admission webhook");

        let serve = tokio::spawn({
            let server = server.clone();
            async move { server.start().await }
        });

        // Hold the shutdown watch until the server has drained.
        tokio::spawn(async move {
            let release = watch.signaled().await;
            release.release_after(server.stop()).await;
        });

        // Block on the shutdown signal. Once it fires, wait for the server to
        // drain before exiting.
        if shutdown.signaled().await.is_err() {
            bail!("Aborted");
        }

        serve.await?;
        Ok(())
    }
}
