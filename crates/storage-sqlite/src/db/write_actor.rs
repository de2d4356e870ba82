//! Single writer thread. Every mutation of either database goes through
//! [`WriteHandle::exec`], which runs the job inside one `BEGIN IMMEDIATE`
//! transaction on a dedicated connection, so writes are serialized and a
//! failing job leaves nothing behind.

use std::thread;

use diesel::SqliteConnection;
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use checkin_core::errors::{DatabaseError, Error, Result};

use super::DbPool;

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

#[derive(Clone)]
pub struct WriteHandle {
    jobs: mpsc::UnboundedSender<Job>,
}

/// Error type threaded through diesel's transaction so job errors roll back.
enum TxError {
    Diesel(diesel::result::Error),
    Job(Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Diesel(err)
    }
}

/// Starts the writer thread. It owns one pooled connection until every
/// [`WriteHandle`] clone has been dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (jobs, mut inbox) = mpsc::unbounded_channel::<Job>();

    let spawned = thread::Builder::new()
        .name("checkin-db-writer".to_string())
        .spawn(move || {
            let mut conn = match pool.get() {
                Ok(conn) => conn,
                Err(err) => {
                    // Dropping each job drops its reply sender; callers see
                    // a closed channel.
                    error!("[Storage] Writer could not get a connection: {}", err);
                    while let Some(job) = inbox.blocking_recv() {
                        drop(job);
                    }
                    return;
                }
            };
            while let Some(job) = inbox.blocking_recv() {
                job(&mut *conn);
            }
            debug!("[Storage] Writer stopped");
        });

    if let Err(err) = spawned {
        error!("[Storage] Failed to spawn writer thread: {}", err);
    }

    WriteHandle { jobs }
}

impl WriteHandle {
    /// Runs `job` in an immediate transaction on the writer thread.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, response) = oneshot::channel::<Result<T>>();

        let boxed: Job = Box::new(move |conn: &mut SqliteConnection| {
            let outcome = conn
                .immediate_transaction::<T, TxError, _>(|conn| job(conn).map_err(TxError::Job));
            let result = match outcome {
                Ok(value) => Ok(value),
                Err(TxError::Job(err)) => Err(err),
                Err(TxError::Diesel(err)) => Err(Error::Database(DatabaseError::QueryFailed(
                    err.to_string(),
                ))),
            };
            let _ = reply.send(result);
        });

        self.jobs.send(boxed).map_err(|_| {
            Error::Database(DatabaseError::ConnectionFailed(
                "writer thread is not running".to_string(),
            ))
        })?;

        response.await.map_err(|_| {
            Error::Database(DatabaseError::ConnectionFailed(
                "writer dropped the job".to_string(),
            ))
        })?
    }
}
