//! The provisioning steps, in execution order

pub mod app;
pub mod proxy;
pub mod security;
pub mod service;
pub mod system;

use crate::pipeline::step::ProvisioningStep;

pub use app::{edit_until_valid, AppSource, Environment, RegistryAuth};
pub use proxy::ReverseProxy;
pub use security::{Firewall, IntrusionPrevention, SshHardening};
pub use service::{ManagementScripts, PersistConfig, ServiceUnit};
pub use system::{ContainerRuntime, DeployerUser, OsCheck, Packages};

/// Every step in dependency order
pub fn all() -> Vec<Box<dyn ProvisioningStep>> {
    vec![
        Box::new(OsCheck),
        Box::new(Packages),
        Box::new(ContainerRuntime),
        Box::new(DeployerUser),
        Box::new(AppSource),
        Box::new(RegistryAuth),
        Box::new(Environment),
        Box::new(ReverseProxy),
        Box::new(IntrusionPrevention),
        Box::new(SshHardening),
        Box::new(Firewall),
        Box::new(ServiceUnit),
        Box::new(ManagementScripts),
        Box::new(PersistConfig),
    ]
}
