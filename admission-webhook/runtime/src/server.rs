use crate::admission::Admission;
use kubert::server::{Bound, TlsCertPath, TlsKeyPath};
use parking_lot::Mutex;
use std::{
    convert::Infallible,
    net::SocketAddr,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug)]
pub struct ServerParams {
    pub addr: SocketAddr,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub config_file: PathBuf,

    /// How long `stop` waits for open connections before abandoning them.
    pub shutdown_grace: Duration,
}

#[derive(Debug, Error)]
pub enum TlsLoadError {
    #[error("failed to read certificates from {}: {source}", path.display())]
    ReadCerts {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read private key from {}: {source}", path.display())]
    ReadKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TLS credentials: {0}")]
    Invalid(#[source] kubert::server::Error),
}

/// An HTTPS server for the admission endpoints.
///
/// Credentials are checked and the listener is bound when the server is
/// built. A server is started at most once. Stopping it closes the listener
/// and waits, up to the shutdown grace, for open connections to finish their
/// in-flight requests.
pub struct Server {
    addr: SocketAddr,
    admission: Admission,
    shutdown_grace: Duration,
    listener: Mutex<Option<Result<Bound, kubert::server::Error>>>,
    signal: Mutex<Option<drain::Signal>>,
    watch: Mutex<Option<drain::Watch>>,
}

static SERVER: OnceCell<Result<Arc<Server>, Arc<TlsLoadError>>> = OnceCell::const_new();

// === impl Server ===

impl Server {
    pub async fn new(params: ServerParams) -> Result<Self, TlsLoadError> {
        let ServerParams {
            addr,
            cert_file,
            key_file,
            config_file,
            shutdown_grace,
        } = params;

        let args = kubert::ServerArgs {
            server_addr: addr,
            server_tls_key: Some(tls_path::<TlsKeyPath>(&key_file)),
            server_tls_certs: Some(tls_path::<TlsCertPath>(&cert_file)),
        };

        // A listen failure is reported by `start` so that it never prevents
        // the process from handling its shutdown signal.
        let listener = match args.bind().await {
            Ok(bound) => Ok(bound),
            Err(error @ (kubert::server::Error::Bind(..) | kubert::server::Error::LocalAddr(_))) => {
                Err(error)
            }
            Err(kubert::server::Error::TlsKeyReadError(source)) => {
                return Err(TlsLoadError::ReadKey {
                    path: key_file,
                    source,
                })
            }
            Err(kubert::server::Error::TlsCertsReadError(source)) => {
                return Err(TlsLoadError::ReadCerts {
                    path: cert_file,
                    source,
                })
            }
            Err(error) => return Err(TlsLoadError::Invalid(error)),
        };

        let (signal, watch) = drain::channel();
        Ok(Self {
            addr: listener.as_ref().map(Bound::local_addr).unwrap_or(addr),
            admission: Admission::new(config_file),
            shutdown_grace,
            listener: Mutex::new(Some(listener)),
            signal: Mutex::new(Some(signal)),
            watch: Mutex::new(Some(watch)),
        })
    }

    /// Returns the process-wide server, building it on first use.
    ///
    /// Only the first caller's parameters are used. Every caller observes
    /// the same server, or the same error if it could not be built.
    pub async fn shared(params: ServerParams) -> Result<Arc<Self>, Arc<TlsLoadError>> {
        SERVER
            .get_or_init(|| async move { Self::new(params).await.map(Arc::new).map_err(Arc::new) })
            .await
            .clone()
    }

    /// The address the server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serves HTTPS until the server is stopped.
    ///
    /// Failures are logged rather than returned.
    pub async fn start(&self) {
        let listener = self.listener.lock().take();
        let watch = self.watch.lock().take();
        let (bound, watch) = match (listener, watch) {
            (Some(Ok(bound)), Some(watch)) => (bound, watch),
            (Some(Err(error)), _) => {
                error!(%error, "Admission webhook failed to listen");
                return;
            }
            _ => {
                warn!("Admission webhook already started or stopped");
                return;
            }
        };

        let server = bound.spawn(self.admission.clone(), watch);
        info!(addr = %server.local_addr(), "Admission webhook listening");
        if let Err(error) = server.join().await {
            error!(%error, "Admission webhook server task failed");
            return;
        }
        info!(addr = %self.addr, "Admission webhook stopped accepting connections");
    }

    /// Stops accepting connections and waits for open connections to drain.
    ///
    /// Connections still open once the shutdown grace elapses are abandoned,
    /// including peers that never completed a TLS handshake.
    pub async fn stop(&self) {
        // A server that was never started still holds its listener and watch.
        drop(self.listener.lock().take());
        drop(self.watch.lock().take());

        let signal = self.signal.lock().take();
        let Some(signal) = signal else {
            debug!("Admission webhook already stopped");
            return;
        };

        info!(grace = ?self.shutdown_grace, "Draining admission webhook connections");
        if tokio::time::timeout(self.shutdown_grace, signal.drain())
            .await
            .is_err()
        {
            warn!(
                grace = ?self.shutdown_grace,
                "Abandoning admission webhook connections that did not finish in time"
            );
            return;
        }
        info!("Admission webhook connections drained");
    }
}

fn tls_path<P: FromStr<Err = Infallible>>(path: &Path) -> P {
    match path.to_string_lossy().parse() {
        Ok(path) => path,
        Err(never) => match never {},
    }
}
