use safeguard_gateway::{AlertGateway, LocationProvider, SessionBackend};
use safeguard_store::Store;
use safeguard_util::{Clock, SystemClock};
use std::sync::Arc;

/// Collaborators shared by the SOS controller and the session engine
#[derive(Clone)]
pub struct Services {
    pub gateway: Arc<dyn AlertGateway>,
    pub backend: Arc<dyn SessionBackend>,
    pub location: Arc<dyn LocationProvider>,
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    /// Wire collaborators against the wall clock
    pub fn new(
        gateway: Arc<dyn AlertGateway>,
        backend: Arc<dyn SessionBackend>,
        location: Arc<dyn LocationProvider>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            gateway,
            backend,
            location,
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
