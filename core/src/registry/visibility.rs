use crate::device::{Device, DeviceType, MacAddress};
use crate::prelude::EngineResult;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

/// Type toggles plus a case-insensitive substring search over name and MAC.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceFilter {
    /// `None` lets every type through.
    kinds: Option<HashSet<DeviceType>>,
    search: String,
}

impl DeviceFilter {
    pub fn new(kinds: Option<HashSet<DeviceType>>, search: &str) -> Self {
        Self {
            kinds,
            search: search.trim().to_lowercase(),
        }
    }

    /// Builds a filter from the `types=ble,wifi` and `q=...` query values.
    /// An empty type list means no type filtering.
    pub fn from_query(types: Option<&str>, search: Option<&str>) -> EngineResult<Self> {
        let kinds = match types.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => Some(
                raw.split(',')
                    .filter(|part| !part.trim().is_empty())
                    .map(|part| part.parse::<DeviceType>())
                    .collect::<EngineResult<HashSet<DeviceType>>>()?,
            ),
            None => None,
        };
        Ok(Self::new(kinds, search.unwrap_or_default()))
    }

    pub fn matches(&self, device: &Device) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&device.kind) {
                return false;
            }
        }
        self.search.is_empty()
            || device.name.to_lowercase().contains(&self.search)
            || device.mac.as_str().to_lowercase().contains(&self.search)
    }

    pub fn apply(&self, devices: Vec<Device>) -> Vec<Device> {
        devices.into_iter().filter(|d| self.matches(d)).collect()
    }
}

#[derive(Debug, Default)]
struct Selection {
    hidden: HashSet<MacAddress>,
    isolated: Option<MacAddress>,
}

/// Per-device hide and isolate choices that decide what reaches the radar.
///
/// Entries are dropped when their device is evicted, so a MAC that comes
/// back later starts out visible.
#[derive(Debug, Default)]
pub struct Visibility {
    selection: RwLock<Selection>,
}

impl Visibility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hidden(&self, mac: &MacAddress, hidden: bool) {
        let mut selection = self.selection.write().unwrap_or_else(PoisonError::into_inner);
        if hidden {
            selection.hidden.insert(mac.clone());
        } else {
            selection.hidden.remove(mac);
        }
    }

    /// Shows only `mac` on the radar; `None` clears isolation.
    pub fn isolate(&self, mac: Option<MacAddress>) {
        self.selection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .isolated = mac;
    }

    pub fn isolated(&self) -> Option<MacAddress> {
        self.selection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .isolated
            .clone()
    }

    /// Hidden MACs in address order.
    pub fn hidden(&self) -> Vec<MacAddress> {
        let selection = self.selection.read().unwrap_or_else(PoisonError::into_inner);
        let mut hidden: Vec<MacAddress> = selection.hidden.iter().cloned().collect();
        hidden.sort();
        hidden
    }

    /// Clears every choice made for an evicted device.
    pub fn forget(&self, mac: &MacAddress) {
        let mut selection = self.selection.write().unwrap_or_else(PoisonError::into_inner);
        selection.hidden.remove(mac);
        if selection.isolated.as_ref() == Some(mac) {
            selection.isolated = None;
        }
    }

    /// An isolated device wins over the hidden set. Isolating a device that
    /// is not in `devices` leaves the radar empty.
    pub fn visible(&self, devices: Vec<Device>) -> Vec<Device> {
        let selection = self.selection.read().unwrap_or_else(PoisonError::into_inner);
        match &selection.isolated {
            Some(mac) => devices.into_iter().filter(|d| &d.mac == mac).collect(),
            None => devices
                .into_iter()
                .filter(|d| !selection.hidden.contains(&d.mac))
                .collect(),
        }
    }
}
