use crate::store::TileStore;
use crate::viewport::ViewportController;
use crate::{CancelToken, Error, GridSpec, GridTraverser, Mosaic, MosaicConfig, MosaicOutput, Result};
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::oneshot;

enum Command {
    Discover(oneshot::Sender<Result<GridSpec>>),
    Run(oneshot::Sender<Result<MosaicOutput>>),
    Close(oneshot::Sender<Result<()>>),
}

/// An async-friendly pipeline runner backed by a dedicated worker thread.
///
/// The worker thread owns the viewport controller and tile store and runs
/// each command to completion, so the renderer is only ever touched by one
/// thread. Callers await results without needing the controller to be `Send`
/// across tasks.
#[derive(Clone)]
pub struct MosaicWorker {
    cmd_tx: Sender<Command>,
    cancel: CancelToken,
}

impl MosaicWorker {
    /// Spawn the worker. `init` runs on the worker thread and builds the
    /// controller and store it will own.
    pub async fn spawn<C, S, F>(config: MosaicConfig, init: F) -> Result<Self>
    where
        C: ViewportController + 'static,
        S: TileStore + 'static,
        F: FnOnce() -> Result<(C, S)> + Send + 'static,
    {
        let mosaic = Mosaic::new(config)?;
        let cancel = mosaic.cancel_token();

        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx): (oneshot::Sender<Result<()>>, oneshot::Receiver<Result<()>>) =
            oneshot::channel();

        thread::spawn(move || {
            let (mut controller, mut store) = match init() {
                Ok(parts) => parts,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };

            let _ = init_tx.send(Ok(()));

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Discover(resp) => {
                        let res = mosaic.discover(&mut controller, &mut store).and_then(
                            |(grid, horizontal, vertical)| {
                                GridTraverser::from_config(mosaic.config(), mosaic.cancel_token())
                                    .rehome(&mut controller, &grid, &horizontal, &vertical)?;
                                Ok(grid)
                            },
                        );
                        let _ = resp.send(res);
                    }
                    Command::Run(resp) => {
                        let res = mosaic.run(&mut controller, &mut store);
                        let _ = resp.send(res);
                    }
                    Command::Close(resp) => {
                        let _ = resp.send(Ok(()));
                        break;
                    }
                }
            }
        });

        init_rx
            .await
            .map_err(|e| Error::Other(format!("Worker init canceled: {}", e)))??;

        Ok(Self { cmd_tx, cancel })
    }

    /// Scan both axes and report the grid without sweeping. The viewport is
    /// re-homed afterwards, so a later `run` starts from the origin corner.
    pub async fn discover(&self) -> Result<GridSpec> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Discover(tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Discover canceled: {}", e)))?
    }

    /// Run the full pipeline on the worker.
    pub async fn run(&self) -> Result<MosaicOutput> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Run(tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Run canceled: {}", e)))?
    }

    /// Ask the running command to stop at its next step boundary. The token
    /// stays set, so later commands fail with `Error::Cancelled` too.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Shut the worker down, dropping its controller and store.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Close(tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))?
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| Error::Other("Mosaic worker has stopped".into()))
    }
}
