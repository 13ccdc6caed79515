//! Service catalog: one container recipe per supported self-hosted service

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::installers::docker::FLEET_NETWORK;
use crate::installers::{docker_step, run_step, InstallOutcome, InstallTarget, Installer};
use crate::models::host::Service;
use crate::remote::{shell_quote, Transport};

/// How a service is run as a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecipe {
    pub service: Service,
    pub container: &'static str,
    pub image: &'static str,
    pub ports: &'static [&'static str],
    pub volumes: &'static [&'static str],
    pub env: &'static [&'static str],
    /// Port the web UI listens on inside the container
    pub web_port: u16,
    /// Port the web UI is published on the host
    pub direct_port: u16,
}

/// Recipe for `service`; `None` only for [`Service::Unknown`]
pub fn recipe(service: Service) -> Option<ServiceRecipe> {
    let recipe = match service {
        Service::AdGuard => ServiceRecipe {
            service,
            container: "adguardhome",
            image: "adguard/adguardhome:latest",
            ports: &["53:53/tcp", "53:53/udp", "3000:3000/tcp"],
            volumes: &[
                "adguard_work:/opt/adguardhome/work",
                "adguard_conf:/opt/adguardhome/conf",
            ],
            env: &[],
            web_port: 3000,
            direct_port: 3000,
        },
        Service::PiHole => ServiceRecipe {
            service,
            container: "pihole",
            image: "pihole/pihole:latest",
            ports: &["53:53/tcp", "53:53/udp", "8053:80/tcp"],
            volumes: &["pihole_etc:/etc/pihole"],
            env: &["TZ=UTC"],
            web_port: 80,
            direct_port: 8053,
        },
        Service::N8n => ServiceRecipe {
            service,
            container: "n8n",
            image: "docker.n8n.io/n8nio/n8n:latest",
            ports: &["5678:5678"],
            volumes: &["n8n_data:/home/node/.n8n"],
            env: &[],
            web_port: 5678,
            direct_port: 5678,
        },
        Service::Homarr => ServiceRecipe {
            service,
            container: "homarr",
            image: "ghcr.io/ajnart/homarr:latest",
            ports: &["7575:7575"],
            volumes: &[
                "homarr_configs:/app/data/configs",
                "homarr_icons:/app/public/icons",
                "homarr_data:/data",
            ],
            env: &[],
            web_port: 7575,
            direct_port: 7575,
        },
        Service::Dashy => ServiceRecipe {
            service,
            container: "dashy",
            image: "lissy93/dashy:latest",
            ports: &["4000:8080"],
            volumes: &[],
            env: &[],
            web_port: 8080,
            direct_port: 4000,
        },
        Service::Crafty => ServiceRecipe {
            service,
            container: "crafty",
            image: "registry.gitlab.com/crafty-controller/crafty-4:latest",
            ports: &["8443:8443", "8123:8123", "25500-25600:25500-25600"],
            volumes: &[
                "crafty_backups:/crafty/backups",
                "crafty_servers:/crafty/servers",
                "crafty_config:/crafty/app/config",
            ],
            env: &["TZ=Etc/UTC"],
            web_port: 8443,
            direct_port: 8443,
        },
        Service::Portainer => ServiceRecipe {
            service,
            container: "portainer",
            image: "portainer/portainer-ce:latest",
            ports: &["9443:9443", "9000:9000"],
            volumes: &[
                "/var/run/docker.sock:/var/run/docker.sock",
                "portainer_data:/data",
            ],
            env: &[],
            web_port: 9000,
            direct_port: 9000,
        },
        Service::Unknown => return None,
    };
    Some(recipe)
}

impl ServiceRecipe {
    /// Hostname the proxy routes to this service under `domain`
    pub fn proxy_host(&self, domain: &str) -> String {
        format!("{}.{}", self.service.key(), domain.trim_start_matches('.'))
    }

    /// Replace-and-run script for this container
    pub fn run_script(&self, domain: Option<&str>, proxy_available: bool) -> String {
        let mut run = format!(
            "docker run -d --name {} --restart unless-stopped",
            self.container
        );
        if proxy_available {
            run.push_str(&format!(" --network {}", FLEET_NETWORK));
        }
        for port in self.ports {
            run.push_str(&format!(" -p {}", port));
        }
        for volume in self.volumes {
            run.push_str(&format!(" -v {}", volume));
        }
        for env in self.env {
            run.push_str(&format!(" -e {}", shell_quote(env)));
        }
        if let (Some(domain), true) = (domain, proxy_available) {
            run.push_str(&format!(
                " --label caddy={} --label {}",
                shell_quote(&self.proxy_host(domain)),
                shell_quote(&format!("caddy.reverse_proxy={{{{upstreams {}}}}}", self.web_port)),
            ));
        }
        run.push(' ');
        run.push_str(self.image);

        format!(
            "set -e\n\
             docker pull {image}\n\
             docker rm -f {name} >/dev/null 2>&1 || true\n\
             {run}",
            image = self.image,
            name = self.container,
            run = run,
        )
    }
}

/// Installs one catalog service as a container
pub struct ContainerServiceInstaller {
    transport: Arc<dyn Transport>,
    recipe: ServiceRecipe,
}

impl ContainerServiceInstaller {
    pub fn new(transport: Arc<dyn Transport>, recipe: ServiceRecipe) -> Self {
        Self { transport, recipe }
    }
}

#[async_trait]
impl Installer for ContainerServiceInstaller {
    fn name(&self) -> &str {
        self.recipe.service.display_name()
    }

    async fn install(&self, target: &InstallTarget<'_>) -> InstallOutcome {
        let script = self.recipe.run_script(target.domain, target.proxy_available);
        let command = docker_step(target.os, &script);
        let ok = run_step(
            self.transport.as_ref(),
            target.host,
            self.recipe.service.display_name(),
            &command,
        )
        .await;
        if ok {
            info!(
                "{} running on {} at http://{}:{}",
                self.recipe.service.display_name(),
                target.host.label(),
                target.host.address,
                self.recipe.direct_port
            );
        }
        ok.into()
    }
}
