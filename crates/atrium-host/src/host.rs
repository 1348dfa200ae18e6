use atrium_types::Container;

/// Adapter for a DCC application.
///
/// Only [`ls`](Host::ls) is required. The hooks default to doing nothing.
pub trait Host: Send + Sync {
    fn name(&self) -> &str;

    /// Containers currently loaded in the scene.
    fn ls(&self) -> Vec<Container>;

    fn install(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn uninstall(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Run `body` and restore the scene selection afterwards.
    fn maintained_selection(&self, body: &mut dyn FnMut()) {
        body()
    }
}

/// Used when no host has been installed. Its scene is always empty.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultHost;

impl Host for DefaultHost {
    fn name(&self) -> &str {
        "default"
    }

    fn ls(&self) -> Vec<Container> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_host_is_empty_and_runs_bodies() {
        let host = DefaultHost;
        assert!(host.ls().is_empty());
        assert!(host.install().is_ok());

        let mut ran = false;
        host.maintained_selection(&mut || ran = true);
        assert!(ran);
    }
}
