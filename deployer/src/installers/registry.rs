//! Installer lookup by OS and service

use std::collections::HashMap;
use std::sync::Arc;

use crate::installers::docker::{DockerInstaller, ReverseProxyInstaller};
use crate::installers::services::{recipe, ContainerServiceInstaller};
use crate::installers::windows::{RebootOptions, WslInstaller};
use crate::installers::Installer;
use crate::models::host::{OsFamily, Service};
use crate::remote::Transport;

/// Prerequisite installers for one OS family
#[derive(Clone)]
pub struct PlatformInstallers {
    /// Only platforms that need a compatibility layer have one
    pub compat_layer: Option<Arc<dyn Installer>>,
    pub runtime: Arc<dyn Installer>,
    pub reverse_proxy: Arc<dyn Installer>,
}

#[derive(Clone)]
pub struct InstallerRegistry {
    linux: PlatformInstallers,
    windows: PlatformInstallers,
    services: HashMap<Service, Arc<dyn Installer>>,
}

impl InstallerRegistry {
    pub fn new(linux: PlatformInstallers, windows: PlatformInstallers) -> Self {
        Self {
            linux,
            windows,
            services: HashMap::new(),
        }
    }

    /// Register the installer for `service`. `Service::Unknown` is never registered.
    pub fn with_service(mut self, service: Service, installer: Arc<dyn Installer>) -> Self {
        if service != Service::Unknown {
            self.services.insert(service, installer);
        }
        self
    }

    /// The production registry: Docker-based installers over `transport`
    pub fn standard(transport: Arc<dyn Transport>, reboot: RebootOptions) -> Self {
        let docker: Arc<dyn Installer> = Arc::new(DockerInstaller::new(transport.clone()));
        let proxy: Arc<dyn Installer> = Arc::new(ReverseProxyInstaller::new(transport.clone()));

        let linux = PlatformInstallers {
            compat_layer: None,
            runtime: docker.clone(),
            reverse_proxy: proxy.clone(),
        };
        let windows = PlatformInstallers {
            compat_layer: Some(Arc::new(WslInstaller::new(transport.clone(), reboot))),
            runtime: docker,
            reverse_proxy: proxy,
        };

        Service::ALL
            .into_iter()
            .filter_map(recipe)
            .fold(Self::new(linux, windows), |registry, recipe| {
                let service = recipe.service;
                let installer = ContainerServiceInstaller::new(transport.clone(), recipe);
                registry.with_service(service, Arc::new(installer))
            })
    }

    /// Prerequisites for `os`; none for an unclassified host
    pub fn platform(&self, os: OsFamily) -> Option<&PlatformInstallers> {
        match os {
            OsFamily::Linux => Some(&self.linux),
            OsFamily::Windows => Some(&self.windows),
            OsFamily::Unknown => None,
        }
    }

    pub fn service(&self, service: Service) -> Option<Arc<dyn Installer>> {
        self.services.get(&service).cloned()
    }
}
