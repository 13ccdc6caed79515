//! Container runtime and reverse proxy installers

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::installers::{docker_step, run_step, InstallOutcome, InstallTarget, Installer};
use crate::models::host::OsFamily;
use crate::remote::Transport;

/// Docker network shared by the proxy and every service container
pub const FLEET_NETWORK: &str = "homefleet";

/// Name of the reverse proxy container
pub const PROXY_CONTAINER: &str = "homefleet-proxy";

const PROXY_IMAGE: &str = "lucaslorentz/caddy-docker-proxy:ci-alpine";

fn runtime_script(os: OsFamily) -> String {
    // systemd is not guaranteed inside WSL, the sysv wrapper is
    let start = match os {
        OsFamily::Windows => "(service docker start >/dev/null 2>&1 || true)",
        _ => "(systemctl enable --now docker >/dev/null 2>&1 || service docker start >/dev/null 2>&1 || true)",
    };
    format!(
        "set -e\n\
         if ! command -v docker >/dev/null 2>&1; then\n\
         curl -fsSL https://get.docker.com | sh\n\
         fi\n\
         {}\n\
         docker info >/dev/null",
        start
    )
}

fn proxy_script() -> String {
    format!(
        "docker network inspect {net} >/dev/null 2>&1 || docker network create {net} >/dev/null\n\
         if [ -n \"$(docker ps -q -f name=^{name}$)\" ]; then exit 0; fi\n\
         docker rm -f {name} >/dev/null 2>&1 || true\n\
         docker run -d --name {name} --restart unless-stopped --network {net} \
         -p 80:80 -p 443:443 \
         -e CADDY_INGRESS_NETWORKS={net} \
         -v /var/run/docker.sock:/var/run/docker.sock \
         -v homefleet_caddy:/data \
         {image}",
        net = FLEET_NETWORK,
        name = PROXY_CONTAINER,
        image = PROXY_IMAGE,
    )
}

/// Installs Docker natively on Linux or inside the WSL distribution on Windows
pub struct DockerInstaller {
    transport: Arc<dyn Transport>,
}

impl DockerInstaller {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Installer for DockerInstaller {
    fn name(&self) -> &str {
        "docker"
    }

    async fn install(&self, target: &InstallTarget<'_>) -> InstallOutcome {
        let command = docker_step(target.os, &runtime_script(target.os));
        let ok = run_step(self.transport.as_ref(), target.host, "Docker install", &command).await;
        if ok {
            info!("Docker is available on {}", target.host.label());
        }
        ok.into()
    }
}

/// Runs a label-driven Caddy proxy container in front of the services
pub struct ReverseProxyInstaller {
    transport: Arc<dyn Transport>,
}

impl ReverseProxyInstaller {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Installer for ReverseProxyInstaller {
    fn name(&self) -> &str {
        "reverse proxy"
    }

    async fn install(&self, target: &InstallTarget<'_>) -> InstallOutcome {
        let command = docker_step(target.os, &proxy_script());
        run_step(self.transport.as_ref(), target.host, "Reverse proxy", &command)
            .await
            .into()
    }
}
