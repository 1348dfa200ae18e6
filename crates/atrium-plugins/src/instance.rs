use atrium_session::keys;
use serde_json::{Map, Value};

/// What a [`Creator`](crate::Creator) is asked to create.
///
/// `data` starts from the envelope `{id, family, asset, subset, active}`
/// with the caller's data merged over it.
#[derive(Clone, Debug, PartialEq)]
pub struct CreatorInstance {
    name: String,
    asset: String,
    family: String,
    options: Map<String, Value>,
    data: Map<String, Value>,
}

impl CreatorInstance {
    pub fn new(
        name: &str,
        asset: &str,
        family: &str,
        options: Map<String, Value>,
        data: Map<String, Value>,
    ) -> Self {
        let marker = keys::default_for(keys::INSTANCE_ID).unwrap_or("atrium.instance");
        let mut envelope = Map::new();
        envelope.insert("id".into(), Value::from(marker));
        envelope.insert("family".into(), Value::from(family));
        envelope.insert("asset".into(), Value::from(asset));
        envelope.insert("subset".into(), Value::from(name));
        envelope.insert("active".into(), Value::Bool(true));
        envelope.extend(data);

        Self {
            name: name.to_string(),
            asset: asset.to_string(),
            family: family.to_string(),
            options,
            data: envelope,
        }
    }

    /// Replace the `id` marker, normally with the session's instance id.
    pub fn with_marker(mut self, marker: &str) -> Self {
        self.data.insert("id".into(), Value::from(marker));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    /// True when `options.useSelection` is set.
    pub fn use_selection(&self) -> bool {
        self.options
            .get("useSelection")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }
}
