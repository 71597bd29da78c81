// canbus-setup/src/template.rs
//
// Templates for the configuration files of each scheme.
//
// This file is part of the Rust 'canbus-setup' tool.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Configuration file templates.

use crate::{
    params::DesiredParameters,
    scheme::{Layout, Scheme},
};
use std::path::PathBuf;

/// Renders the files of `scheme` for the parameters.
///
/// Returns the path and contents of each file, in the same order as
/// [`Layout::files`].
pub fn render(
    layout: &Layout,
    scheme: Scheme,
    params: &DesiredParameters,
) -> Vec<(PathBuf, String)> {
    let iface = layout.iface();
    let contents = match scheme {
        Scheme::Legacy => vec![legacy_interface(iface, params)],
        Scheme::SchemeA => vec![
            networkd_a(iface, params),
            udev_rule(iface, params),
        ],
        Scheme::SchemeB => vec![
            networkd_b(iface, params),
            txqueuelen_service(iface, params),
        ],
    };
    layout.files(scheme).paths.into_iter().zip(contents).collect()
}

fn legacy_interface(iface: &str, params: &DesiredParameters) -> String {
    format!(
        "allow-hotplug {iface}\n\
         iface {iface} can static\n\
         \x20   bitrate {bitrate}\n\
         \x20   up ip link set $IFACE txqueuelen {qlen}\n",
        iface = iface,
        bitrate = params.bitrate,
        qlen = params.txqueuelen,
    )
}

fn networkd_a(iface: &str, params: &DesiredParameters) -> String {
    format!(
        r#"[Match]
Name={iface}

[CAN]
BitRate={bitrate}

[Link]
RequiredForOnline=no
"#,
        iface = iface,
        bitrate = params.bitrate,
    )
}

fn udev_rule(iface: &str, params: &DesiredParameters) -> String {
    format!(
        "SUBSYSTEM==\"net\", ACTION==\"change|add\", KERNEL==\"{iface}\", ATTR{{tx_queue_len}}=\"{qlen}\"\n",
        iface = iface,
        qlen = params.txqueuelen,
    )
}

fn networkd_b(iface: &str, params: &DesiredParameters) -> String {
    format!(
        r#"[Match]
Name={iface}

[CAN]
BitRate={bitrate}
RestartSec=100ms
"#,
        iface = iface,
        bitrate = params.bitrate,
    )
}

fn txqueuelen_service(iface: &str, params: &DesiredParameters) -> String {
    format!(
        r#"[Unit]
Description=Set the transmit queue length of {iface}
BindsTo=sys-subsystem-net-devices-{iface}.device
After=sys-subsystem-net-devices-{iface}.device

[Service]
Type=oneshot
ExecStart=/sbin/ifconfig {iface} txqueuelen {qlen}
RemainAfterExit=yes

[Install]
WantedBy=sys-subsystem-net-devices-{iface}.device
"#,
        iface = iface,
        qlen = params.txqueuelen,
    )
}

/////////////////////////////////////////////////////////////////////////////
