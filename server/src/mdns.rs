//! DNS-SD advertisement of the query API as `_nmos-query._tcp`.

use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::info;

use crate::config::Config;

const SERVICE_TYPE: &str = "_nmos-query._tcp.local.";

/// Publish the enabled adverts. Under `mixed` mode both an http and an
/// https record go out. The returned daemon keeps them registered; shut it
/// down to withdraw them.
pub fn advertise(config: &Config) -> anyhow::Result<ServiceDaemon> {
    let daemon = ServiceDaemon::new()?;
    let host = config.advertised_host();
    let port = config.bind.port();
    let pri = config.priority.to_string();
    let api_ver = config
        .enabled_versions()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");

    if config.https_mode.advertises_http() {
        register(&daemon, &format!("query_{host}_http"), &host, port, &pri, &api_ver, "http")?;
    }
    if config.https_mode.advertises_https() {
        register(&daemon, &format!("query_{host}_https"), &host, port, &pri, &api_ver, "https")?;
    }
    Ok(daemon)
}

fn register(
    daemon: &ServiceDaemon,
    instance: &str,
    host: &str,
    port: u16,
    pri: &str,
    api_ver: &str,
    api_proto: &str,
) -> anyhow::Result<()> {
    let txt = [("pri", pri), ("api_ver", api_ver), ("api_proto", api_proto)];
    let info = ServiceInfo::new(SERVICE_TYPE, instance, &format!("{host}.local."), "", port, &txt[..])?
        .enable_addr_auto();
    daemon.register(info)?;
    info!(instance, api_proto, "mDNS advert published");
    Ok(())
}
