pub mod add_mapping;
pub mod capture_session;
pub mod console;
pub mod hook;
pub mod hook_engine;
pub mod mapping_table;
pub mod settings_store;
pub mod virtual_device;

pub use add_mapping::{AddMappingWorkflow, AddOutcome, ConflictResolver};
pub use capture_session::{CapturePhase, CaptureSession};
pub use console::{Console, ConsoleExit, ConsoleResolver};
pub use hook::{create_hook_backend, HookBackend, HookHandle};
pub use hook_engine::{HookEngine, KeyInjector};
pub use mapping_table::MappingTable;
pub use settings_store::SettingsStore;
pub use virtual_device::VirtualDevice;
