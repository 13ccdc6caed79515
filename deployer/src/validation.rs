//! Static host validation, run before any remote call is made

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::host::{HostDescriptor, HostId};

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Field of a host entry that failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostField {
    Address,
    User,
    Secret,
    Service,
}

impl fmt::Display for HostField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostField::Address => "address",
            HostField::User => "user",
            HostField::Secret => "secret",
            HostField::Service => "service",
        };
        f.write_str(name)
    }
}

/// One problem with one field of one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub host_id: HostId,
    pub address: String,
    pub field: HostField,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "host #{} ({}): {}: {}",
            self.host_id, self.address, self.field, self.message
        )
    }
}

/// Whether `address` is a dotted-quad IPv4 address or a plausible hostname.
///
/// Strings made only of digits and dots are never treated as hostnames, so an
/// out-of-range quad such as `256.1.1.1` is rejected.
pub fn test_address(address: &str) -> bool {
    if address.is_empty() {
        return false;
    }
    if is_dotted_quad(address) {
        return true;
    }
    if address.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return false;
    }
    is_hostname(address)
}

fn is_dotted_quad(address: &str) -> bool {
    let octets: Vec<&str> = address.split('.').collect();
    octets.len() == 4
        && octets.iter().all(|octet| {
            !octet.is_empty()
                && octet.len() <= 3
                && octet.chars().all(|c| c.is_ascii_digit())
                && octet.parse::<u16>().map(|n| n <= 255).unwrap_or(false)
        })
}

fn is_hostname(address: &str) -> bool {
    if address.len() > MAX_HOSTNAME_LEN {
        return false;
    }
    address.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// The address issue for `address`, if it is not a valid target
pub fn address_issue(host_id: HostId, address: &str) -> Option<ValidationIssue> {
    if test_address(address) {
        return None;
    }
    Some(ValidationIssue {
        host_id,
        address: address.to_string(),
        field: HostField::Address,
        message: format!("'{}' is not a valid IPv4 address or hostname", address),
    })
}

/// Issues that would keep homefleet from logging in to the host at all
pub fn validate_access(host: &HostDescriptor) -> Vec<ValidationIssue> {
    let mut issues: Vec<ValidationIssue> = address_issue(host.id, &host.address).into_iter().collect();
    let mut push = |field: HostField, message: &str| {
        issues.push(ValidationIssue {
            host_id: host.id,
            address: host.address.clone(),
            field,
            message: message.to_string(),
        });
    };

    if host.user.trim().is_empty() {
        push(HostField::User, "missing user");
    }
    if !host.has_secret() {
        push(HostField::Secret, "missing password or key");
    }

    issues
}

/// Validate a single host for deployment, returning every issue found
pub fn validate_host(host: &HostDescriptor) -> Vec<ValidationIssue> {
    let mut issues = validate_access(host);
    if host.service.is_none() {
        issues.push(ValidationIssue {
            host_id: host.id,
            address: host.address.clone(),
            field: HostField::Service,
            message: "no service selected".to_string(),
        });
    }
    issues
}

fn collect_issues<F>(hosts: &[HostDescriptor], check: F) -> Result<(), Vec<ValidationIssue>>
where
    F: Fn(&HostDescriptor) -> Vec<ValidationIssue>,
{
    let issues: Vec<ValidationIssue> = hosts.iter().flat_map(check).collect();
    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

/// Validate a deployment. A run must not start unless this returns `Ok`.
pub fn validate_hosts(hosts: &[HostDescriptor]) -> Result<(), Vec<ValidationIssue>> {
    collect_issues(hosts, validate_host)
}

/// Validate a read-only health run; the service selection does not matter
pub fn validate_hosts_access(hosts: &[HostDescriptor]) -> Result<(), Vec<ValidationIssue>> {
    collect_issues(hosts, validate_access)
}
