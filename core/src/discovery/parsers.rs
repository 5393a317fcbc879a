//! Defensive parsers for the text output of external discovery tools.
//!
//! Blank or malformed lines and invalid MACs are skipped; missing optional
//! fields fall back to defaults.

use crate::device::{DeviceType, DiscoveryEvent, MacAddress};
use log::debug;

/// `hcitool scan` reports no signal strength.
pub const CLASSIC_DEFAULT_RSSI: f64 = -75.0;
pub const WIFI_DEFAULT_RSSI: f64 = -80.0;

fn parse_mac(raw: &str) -> Option<MacAddress> {
    match MacAddress::parse(raw) {
        Ok(mac) => Some(mac),
        Err(err) => {
            debug!("dropping record: {}", err);
            None
        }
    }
}

/// `hcitool scan --flush`: a `Scanning ...` header, then `MAC<TAB>Name`.
pub fn parse_hcitool_scan(output: &str) -> Vec<DiscoveryEvent> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("Scanning"))
        .filter_map(|line| {
            let mut parts = line.splitn(2, '\t');
            let mac = parse_mac(parts.next()?)?;
            let name = parts.next().map(str::trim).unwrap_or_default();
            Some(DiscoveryEvent::new(
                mac,
                name,
                CLASSIC_DEFAULT_RSSI,
                DeviceType::Classic,
            ))
        })
        .collect()
}

/// Splits an nmcli terse line on unescaped colons (`\:` is a literal colon).
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => current.push('\\'),
            },
            ':' => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    fields.push(current);
    fields
}

/// `nmcli -t -f BSSID,SSID,FREQ,CHAN,SIGNAL dev wifi list`.
///
/// SIGNAL is a 0–100 quality figure mapped linearly onto -100..-30 dBm.
pub fn parse_nmcli(output: &str) -> Vec<DiscoveryEvent> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let fields = split_terse(line);
            if fields.len() < 5 {
                debug!("dropping nmcli line with {} fields", fields.len());
                return None;
            }
            let mac = parse_mac(&fields[0])?;
            let ssid = fields[1].trim();
            let frequency = fields[2]
                .trim()
                .trim_end_matches("MHz")
                .trim()
                .parse::<u32>()
                .unwrap_or(0);
            let channel = fields[3].trim().parse::<u32>().unwrap_or(0);
            let rssi = fields[4]
                .trim()
                .parse::<i32>()
                .map(|signal| (-100 + signal * 70 / 100) as f64)
                .unwrap_or(WIFI_DEFAULT_RSSI);
            Some(DiscoveryEvent::new(mac, ssid, rssi, DeviceType::WiFi).with_radio(frequency, channel))
        })
        .collect()
}

/// `iw dev <iface> scan`: one `BSS <mac>(on <iface>)` block per access point.
pub fn parse_iw_scan(output: &str) -> Vec<DiscoveryEvent> {
    let mut results = Vec::new();
    let mut current: Option<DiscoveryEvent> = None;

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("BSS ") {
            results.extend(current.take());
            let raw = rest.split('(').next().unwrap_or_default();
            current = parse_mac(raw)
                .map(|mac| DiscoveryEvent::new(mac, "", WIFI_DEFAULT_RSSI, DeviceType::WiFi));
            continue;
        }

        let Some(event) = current.as_mut() else {
            continue;
        };
        let trimmed = line.trim().trim_start_matches("* ");

        if let Some(ssid) = trimmed.strip_prefix("SSID: ") {
            event.name = ssid.to_string();
        } else if let Some(freq) = trimmed.strip_prefix("freq: ") {
            // Newer iw prints fractional MHz, e.g. "2437.0".
            if let Ok(value) = freq.trim().parse::<f64>() {
                event.frequency = value as u32;
            }
        } else if let Some(signal) = trimmed.strip_prefix("signal: ") {
            if let Ok(value) = signal.trim_end_matches("dBm").trim().parse::<f64>() {
                event.rssi = Some(value);
            }
        } else if let Some(chan) = trimmed.strip_prefix("DS Parameter set: channel ") {
            if let Ok(value) = chan.trim().parse() {
                event.channel = value;
            }
        } else if let Some(chan) = trimmed.strip_prefix("primary channel: ") {
            if event.channel == 0 {
                if let Ok(value) = chan.trim().parse() {
                    event.channel = value;
                }
            }
        }
    }

    results.extend(current);
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hcitool_scan_skips_header_blank_and_bad_lines() {
        let output = "Scanning ...\n\t00:1A:7D:DA:71:13\tJBL Flip 6\n\n\tnot-a-mac\tBroken\n\t11:22:33:44:55:66\n";
        let events = parse_hcitool_scan(output);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].mac.as_str(), "00:1A:7D:DA:71:13");
        assert_eq!(events[0].name, "JBL Flip 6");
        assert_eq!(events[0].rssi, Some(CLASSIC_DEFAULT_RSSI));
        assert_eq!(events[0].kind, DeviceType::Classic);
        assert_eq!(events[1].name, "");
    }

    #[test]
    fn nmcli_unescapes_colons_and_maps_signal() {
        let output = "AA\\:BB\\:CC\\:DD\\:EE\\:FF:Cafe\\:Guest:2437 MHz:6:75\n\
                      11\\:22\\:33\\:44\\:55\\:66::5180 MHz:36:\n\
                      garbage line\n";
        let events = parse_nmcli(output);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].mac.as_str(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(events[0].name, "Cafe:Guest");
        assert_eq!((events[0].frequency, events[0].channel), (2437, 6));
        assert_eq!(events[0].rssi, Some(-48.0));
        assert_eq!(events[1].name, "");
        assert_eq!(events[1].rssi, Some(WIFI_DEFAULT_RSSI));
        assert_eq!(events[1].frequency, 5180);
    }

    #[test]
    fn iw_scan_collects_bss_blocks() {
        let output = "BSS aa:bb:cc:dd:ee:ff(on wlan0)\n\
                      \tfreq: 5180\n\
                      \tsignal: -61.00 dBm\n\
                      \tSSID: HomeNetwork\n\
                      \t * primary channel: 36\n\
                      BSS zz:zz(on wlan0)\n\
                      \tSSID: Ignored\n\
                      BSS 11:22:33:44:55:66(on wlan0) -- associated\n\
                      \tfreq: 2412.0\n\
                      \tDS Parameter set: channel 1\n\
                      \t * primary channel: 9\n";
        let events = parse_iw_scan(output);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].mac.as_str(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(events[0].name, "HomeNetwork");
        assert_eq!(events[0].rssi, Some(-61.0));
        assert_eq!((events[0].frequency, events[0].channel), (5180, 36));
        assert_eq!(events[1].rssi, Some(WIFI_DEFAULT_RSSI));
        assert_eq!((events[1].frequency, events[1].channel), (2412, 1));
    }
}
