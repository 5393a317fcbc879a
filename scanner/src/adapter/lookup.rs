use async_trait::async_trait;
use proxcore::discovery::NameLookup;
use proxcore::{EngineError, EngineResult, MacAddress};
use std::process::Stdio;
use tokio::process::Command;

/// Remote name request over classic Bluetooth (`hcitool name`).
#[derive(Debug, Clone)]
pub struct HcitoolLookup {
    adapter: String,
}

impl HcitoolLookup {
    pub fn new(adapter: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
        }
    }
}

#[async_trait]
impl NameLookup for HcitoolLookup {
    async fn lookup(&self, mac: &MacAddress) -> EngineResult<Option<String>> {
        let output = Command::new("hcitool")
            .args(["-i", &self.adapter, "name", mac.as_str()])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| EngineError::ResolutionFailure(format!("hcitool name {}: {}", mac, err)))?;
        if !output.status.success() {
            return Err(EngineError::ResolutionFailure(format!(
                "hcitool name {} exited with {}",
                mac, output.status
            )));
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!name.is_empty()).then_some(name))
    }
}
