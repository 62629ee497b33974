use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use crate::focus::Focusable;
use crate::model::{DetailTable, PanelId};
use crate::repository::{
    ApiResult, IpAddress, Repositories, Snapshot, Vps, VpsBackup, VpsRepository,
};

const TIMESTAMP_FORMAT: &str = "%b %d %H:%M:%S";

/// One facet of the selected resource.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DetailPanel {
    pub id: PanelId,
    pub table: DetailTable,
}

impl Focusable for DetailPanel {
    fn panel(&self) -> PanelId {
        self.id
    }
}

/// Everything shown for one VPS. Panels are kept in focus order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VpsInfo {
    pub name: String,
    pub panels: Vec<DetailPanel>,
}

impl VpsInfo {
    #[cfg(test)]
    pub fn panel(&self, id: PanelId) -> Option<&DetailPanel> {
        self.panels.iter().find(|panel| panel.id == id)
    }

    pub fn panel_mut(&mut self, id: PanelId) -> Option<&mut DetailPanel> {
        self.panels.iter_mut().find(|panel| panel.id == id)
    }
}

pub struct ProductInfo {
    vps: Arc<dyn VpsRepository>,
    current: Option<VpsInfo>,
}

impl ProductInfo {
    pub fn new(repos: &Repositories) -> Self {
        Self {
            vps: repos.vps.clone(),
            current: None,
        }
    }

    pub fn current(&self) -> Option<&VpsInfo> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut VpsInfo> {
        self.current.as_mut()
    }

    /// Fetches the VPS and its addresses, backups and snapshots one after another and
    /// only then replaces the current view. Any failure keeps the previous view.
    pub async fn show_vps(&mut self, name: &str) -> Result<&VpsInfo> {
        let vps = timed_fetch("vps", name, self.vps.get_by_name(name)).await?;
        let ips = timed_fetch("ip data", name, self.vps.get_ip_addresses(name)).await?;
        let backups = timed_fetch("backups", name, self.vps.get_backups(name)).await?;
        let snapshots = timed_fetch("snapshots", name, self.vps.get_snapshots(name)).await?;

        let info = build_vps_info(&vps, &ips, &backups, &snapshots, &Local);
        let shown: &VpsInfo = self.current.insert(info);
        Ok(shown)
    }
}

async fn timed_fetch<T, F>(what: &str, name: &str, fetch: F) -> Result<T>
where
    F: Future<Output = ApiResult<T>>,
{
    debug!(name, "fetching {what}");
    let started = Instant::now();
    match fetch.await {
        Ok(value) => {
            debug!(
                name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "done fetching {what}"
            );
            Ok(value)
        }
        Err(fetch_error) => {
            error!(
                name,
                error = %fetch_error,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "error fetching {what}"
            );
            Err(fetch_error).with_context(|| format!("failed to fetch {what} for {name}"))
        }
    }
}

pub fn build_vps_info<Tz>(
    vps: &Vps,
    ips: &[IpAddress],
    backups: &[VpsBackup],
    snapshots: &[Snapshot],
    tz: &Tz,
) -> VpsInfo
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    VpsInfo {
        name: vps.name.clone(),
        panels: vec![
            DetailPanel {
                id: PanelId::Overview,
                table: overview_table(vps),
            },
            DetailPanel {
                id: PanelId::Backups,
                table: backups_table(backups, tz),
            },
            DetailPanel {
                id: PanelId::Snapshots,
                table: snapshots_table(snapshots, tz),
            },
            DetailPanel {
                id: PanelId::Network,
                table: network_table(ips),
            },
        ],
    }
}

pub fn overview_table(vps: &Vps) -> DetailTable {
    let mut table = DetailTable::new("Overview");
    table.push_row(["Name", vps.name.as_str()]);
    table.push_row(["Description", vps.description.as_str()]);
    table.push_row(["Product", vps.product_name.as_str()]);
    table.push_row(["Availability zone", vps.availability_zone.as_str()]);
    table.push_row(["CPUs".to_string(), vps.cpus.to_string()]);
    table.push_row(["Disk size".to_string(), format_size(vps.disk_size)]);
    table.push_row(["Memory".to_string(), format_size(vps.memory_size)]);
    table
}

pub fn network_table(ips: &[IpAddress]) -> DetailTable {
    let mut table =
        DetailTable::new("Network").with_headers(["IP", "Subnet", "Gateway", "Reverse DNS"]);
    for ip in ips {
        table.push_row([
            ip.address.to_string(),
            ip.subnet_mask.to_string(),
            ip.gateway.map(|gateway| gateway.to_string()).unwrap_or_default(),
            ip.reverse_dns.clone(),
        ]);
    }
    table
}

pub fn backups_table<Tz>(backups: &[VpsBackup], tz: &Tz) -> DetailTable
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut table = DetailTable::new("Backups").with_headers([
        "Created",
        "Size",
        "Status",
        "Availability zone",
    ]);
    for backup in backups {
        table.push_row([
            format_timestamp(backup.created_at, tz),
            format_size(backup.disk_size),
            backup.status.clone(),
            backup.availability_zone.clone(),
        ]);
    }
    table
}

pub fn snapshots_table<Tz>(snapshots: &[Snapshot], tz: &Tz) -> DetailTable
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut table =
        DetailTable::new("Snapshots").with_headers(["Created", "Size", "Status", "Description"]);
    for snapshot in snapshots {
        table.push_row([
            format_timestamp(snapshot.created_at, tz),
            format_size(snapshot.disk_size),
            snapshot.status.clone(),
            snapshot.description.clone(),
        ]);
    }
    table
}

/// KiB to whole gigabytes, truncating.
pub fn format_size(kib: u64) -> String {
    format!("{}G", kib / 1024 / 1024)
}

pub fn format_timestamp<Tz>(instant: DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    instant
        .with_timezone(tz)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}
