use serde_json::{json, Map, Value};

use spotline_core::PositionId;

use crate::context::MaterialRelease;
use crate::contracts::SerializerPlugin;
use crate::errors::{PluginError, PluginResult};
use crate::pipeline::{best_mapping, SerializerLevel, SerializerMapping};

use super::JSON_SERIALIZER;

/// Renders every level as JSON
///
/// Outputs of the previous level are embedded as JSON when they parse and
/// as strings otherwise, so a non-JSON ad serializer can still be nested.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

fn embed(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn extensions(
    mappings: &[SerializerMapping],
    level: SerializerLevel,
    position: Option<PositionId>,
    release: Option<&MaterialRelease>,
) -> Map<String, Value> {
    best_mapping(mappings, level, position, release.map(|r| r.creative_type))
        .map(|mapping| {
            mapping
                .extensions
                .iter()
                .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                .collect()
        })
        .unwrap_or_default()
}

fn render(value: &Value) -> PluginResult<String> {
    serde_json::to_string(value).map_err(|err| PluginError::failed(JSON_SERIALIZER, err.to_string()))
}

impl SerializerPlugin for JsonSerializer {
    fn serialize_ad(
        &self,
        release: &MaterialRelease,
        mappings: &[SerializerMapping],
    ) -> PluginResult<String> {
        let mut value = json!({
            "ad": release.ad,
            "material": release.material,
            "creativeType": release.creative_type,
            "sequence": release.sequence,
        });
        let ext = extensions(mappings, SerializerLevel::Ad, Some(release.position), Some(release));
        if !ext.is_empty() {
            value["extensions"] = Value::Object(ext);
        }
        render(&value)
    }

    fn serialize_position(
        &self,
        position: PositionId,
        ads: &[String],
        mappings: &[SerializerMapping],
    ) -> PluginResult<String> {
        let mut value = json!({
            "position": position,
            "ads": ads.iter().map(|ad| embed(ad)).collect::<Vec<_>>(),
        });
        let ext = extensions(mappings, SerializerLevel::Position, Some(position), None);
        if !ext.is_empty() {
            value["extensions"] = Value::Object(ext);
        }
        render(&value)
    }

    fn serialize_global(
        &self,
        positions: &[(PositionId, String)],
        mappings: &[SerializerMapping],
    ) -> PluginResult<String> {
        let mut value = json!({
            "positions": positions.iter().map(|(_, rendered)| embed(rendered)).collect::<Vec<_>>(),
        });
        let ext = extensions(mappings, SerializerLevel::Global, None, None);
        if !ext.is_empty() {
            value["extensions"] = Value::Object(ext);
        }
        render(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{PluginId, PluginVersion};
    use spotline_core::{Ad, CreativeTypeId, MaterialId};

    fn release() -> MaterialRelease {
        MaterialRelease {
            ad: Ad::new(1, 2, 3, 4),
            material: MaterialId::new(77),
            creative_type: CreativeTypeId::new(5),
            position: PositionId::new(10),
            sequence: 0,
            policy: PluginId::new("plan-order"),
            policy_version: PluginVersion::new(1, 0, 0),
        }
    }

    #[test]
    fn test_levels_nest() {
        let serializer = JsonSerializer;
        let ad = serializer.serialize_ad(&release(), &[]).unwrap();
        let position = serializer
            .serialize_position(PositionId::new(10), &[ad, "plain".to_string()], &[])
            .unwrap();
        let global = serializer
            .serialize_global(&[(PositionId::new(10), position)], &[])
            .unwrap();

        let value: Value = serde_json::from_str(&global).unwrap();
        assert_eq!(value["positions"][0]["position"], 10);
        assert_eq!(value["positions"][0]["ads"][0]["material"], 77);
        assert_eq!(value["positions"][0]["ads"][1], "plain");
    }
}
