//! Human readable diagnostics for LJM status codes, handles and feedback packets.

use crate::HandleInfo;
use std::fmt::Write as _;
use std::net::Ipv4Addr;

pub const NO_ERROR: i32 = 0;
pub const WARNINGS_BEGIN: i32 = 200;
pub const WARNINGS_END: i32 = 399;

pub const CT_ANY: i32 = 0;
pub const CT_USB: i32 = 1;
pub const CT_TCP: i32 = 2;
pub const CT_ETHERNET: i32 = 3;
pub const CT_WIFI: i32 = 4;

/// Severity of an LJM status code.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    Ok,
    Warning,
    Error,
}

pub fn severity(code: i32) -> Severity {
    if code == NO_ERROR {
        Severity::Ok
    } else if (WARNINGS_BEGIN..=WARNINGS_END).contains(&code) {
        Severity::Warning
    } else {
        Severity::Error
    }
}

/// One-line report for a status code, e.g. `DAC0 write error: "LJME_X" (code 1234) at address 1000`.
pub fn describe_status(context: &str, code: i32, name: &str, address: Option<u32>) -> String {
    let mut out = match severity(code) {
        Severity::Ok => return format!("{context}: ok"),
        Severity::Warning => format!("{context} warning: \"{name}\" (warning code {code})"),
        Severity::Error => format!("{context} error: \"{name}\" (code {code})"),
    };
    if let Some(a) = address {
        let _ = write!(out, " at address {a}");
    }
    out
}

pub fn device_type_name(device_type: i32) -> &'static str {
    match device_type {
        0 => "LJM_dtANY",
        3 => "LJM_dtU3",
        4 => "LJM_dtT4",
        6 => "LJM_dtU6",
        7 => "LJM_dtT7",
        8 => "LJM_dtT8",
        9 => "LJM_dtUE9",
        200 => "LJM_dtDIGIT",
        1000 => "LJM_dtSKYMOTE_BRIDGE",
        _ => "Unknown device type",
    }
}

pub fn connection_type_name(connection_type: i32) -> &'static str {
    match connection_type {
        CT_ANY => "LJM_ctANY",
        CT_USB => "LJM_ctUSB",
        CT_TCP => "LJM_ctTCP",
        CT_ETHERNET => "LJM_ctETHERNET",
        CT_WIFI => "LJM_ctWIFI",
        _ => "Unknown connection type",
    }
}

pub fn is_tcp(connection_type: i32) -> bool {
    matches!(connection_type, CT_TCP | CT_ETHERNET | CT_WIFI)
}

/// Convert the packed integer form LJM uses for IPv4 addresses.
pub fn ipv4_from_number(ip: i32) -> Ipv4Addr {
    Ipv4Addr::from(ip as u32)
}

/// Multi-line device report for an open handle.
pub fn device_info_report(info: &HandleInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "deviceType: {}", device_type_name(info.device_type));
    let _ = writeln!(
        out,
        "connectionType: {}",
        connection_type_name(info.connection_type)
    );
    let _ = writeln!(out, "serialNumber: {}", info.serial_number);
    if is_tcp(info.connection_type) {
        let _ = writeln!(out, "IP address: {}", ipv4_from_number(info.ip_address));
    }
    if info.connection_type == CT_USB {
        let _ = writeln!(out, "pipe: {}", info.port);
    } else {
        let _ = writeln!(out, "port: {}", info.port);
    }
    let _ = writeln!(out, "maxBytesPerMB: {}", info.max_bytes_per_mb);
    out
}

/// Direction of a Modbus feedback packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Command,
    Response,
}

const HEADER_LEN: usize = 8;

fn hex_line(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("0x{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Dump a Modbus feedback (MBFB) packet: header, then command frames or response data.
///
/// Truncated packets are dumped as far as the bytes go.
pub fn feedback_report(packet: &[u8], description: &str, direction: Direction) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{description}:");
    let header = &packet[..packet.len().min(HEADER_LEN)];
    let _ = writeln!(out, "\tHeader:   {}", hex_line(header));
    if packet.len() < HEADER_LEN {
        let _ = writeln!(out, "\t(truncated header)");
        return out;
    }
    let reported = usize::from(packet[4]) + usize::from(packet[5]);
    if reported < 3 {
        let _ = writeln!(out, "\t(No frames)");
        return out;
    }
    let mut remaining = reported - 2;
    match direction {
        Direction::Command => {
            let mut offset = HEADER_LEN;
            let mut frame = 0;
            while remaining > 0 && offset < packet.len() {
                // Write frames carry their register data, read frames are header only.
                let size = if packet[offset] == 1 {
                    packet
                        .get(offset + 3)
                        .map(|&n| usize::from(n) * 2 + 4)
                        .unwrap_or(4)
                } else {
                    4
                };
                let end = (offset + size).min(packet.len());
                let _ = writeln!(out, "\tframe {frame:02}: {}", hex_line(&packet[offset..end]));
                offset += size;
                remaining = remaining.saturating_sub(size);
                frame += 1;
            }
        }
        Direction::Response => {
            let end = (HEADER_LEN + remaining).min(packet.len());
            let _ = writeln!(out, "\tdata:     {}", hex_line(&packet[HEADER_LEN..end]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(severity(0), Severity::Ok);
        assert_eq!(severity(250), Severity::Warning);
        assert_eq!(severity(1224), Severity::Error);
        assert_eq!(
            describe_status("DAC0 write", 1224, "LJME_DEVICE_NOT_OPEN", Some(1000)),
            "DAC0 write error: \"LJME_DEVICE_NOT_OPEN\" (code 1224) at address 1000"
        );
        assert_eq!(describe_status("open", 0, "LJME_NOERROR", None), "open: ok");
    }

    #[test]
    fn tcp_report_includes_ip() {
        let info = HandleInfo {
            device_type: 7,
            connection_type: CT_ETHERNET,
            serial_number: 470012345,
            ip_address: 0xC0A8_010A_u32 as i32,
            port: 502,
            max_bytes_per_mb: 1040,
        };
        let report = device_info_report(&info);
        assert!(report.contains("deviceType: LJM_dtT7"));
        assert!(report.contains("IP address: 192.168.1.10"));
        assert!(report.contains("port: 502"));
    }

    #[test]
    fn usb_report_uses_pipe() {
        let info = HandleInfo {
            device_type: 4,
            connection_type: CT_USB,
            serial_number: 1,
            ip_address: 0,
            port: 2,
            max_bytes_per_mb: 64,
        };
        let report = device_info_report(&info);
        assert!(report.contains("pipe: 2"));
        assert!(!report.contains("IP address"));
    }

    #[test]
    fn command_frames_are_split() {
        // header reports 2 + 4 (read frame) + 6 (write frame, one register)
        let packet = [
            0x00, 0x01, 0x00, 0x00, 0x00, 0x0c, 0x01, 0x4c, // header
            0x00, 0x00, 0x00, 0x02, // read AIN0, 2 registers
            0x01, 0x03, 0xe8, 0x01, 0x40, 0x20, // write DAC0
        ];
        let report = feedback_report(&packet, "cmd", Direction::Command);
        assert!(report.contains("frame 00: 0x00 0x00 0x00 0x02"));
        assert!(report.contains("frame 01: 0x01 0x03 0xe8 0x01 0x40 0x20"));
    }

    #[test]
    fn response_data_and_empty() {
        let packet = [0, 1, 0, 0, 0, 4, 1, 0x4c, 0xaa, 0xbb];
        let report = feedback_report(&packet, "rsp", Direction::Response);
        assert!(report.contains("data:     0xaa 0xbb"));

        let empty = [0, 1, 0, 0, 0, 2, 1, 0x4c];
        assert!(feedback_report(&empty, "rsp", Direction::Response).contains("(No frames)"));
    }
}
