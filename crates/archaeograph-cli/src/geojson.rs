//! GeoJSON export of a cleaned layer for the map view.

use anyhow::{Context, Result};
use archaeograph_core::schema::{GEOMETRY_COLUMN, LAT_COLUMN, LON_COLUMN};
use archaeograph_core::Value;
use archaeograph_staging::columnar::ColumnarSnapshotV1;
use serde_json::{json, Map};
use std::path::Path;

fn to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::Text(s) => json!(s),
    }
}

/// `FeatureCollection` of WGS84 points; rows without `Lon`/`Lat` are left out.
pub fn feature_collection(snapshot: &ColumnarSnapshotV1) -> serde_json::Value {
    let lon = snapshot.column(LON_COLUMN).unwrap_or_default();
    let lat = snapshot.column(LAT_COLUMN).unwrap_or_default();
    let skip = [GEOMETRY_COLUMN, LON_COLUMN, LAT_COLUMN];

    let mut features = Vec::with_capacity(snapshot.rows);
    for row in 0..snapshot.rows {
        let (Some(x), Some(y)) = (
            lon.get(row).and_then(Value::as_f64),
            lat.get(row).and_then(Value::as_f64),
        ) else {
            continue;
        };
        let mut properties = Map::new();
        for column in snapshot.columns.iter().filter(|c| !skip.contains(&c.name.as_str())) {
            let value = column.values.get(row).unwrap_or(&Value::Null);
            properties.insert(column.name.clone(), to_json(value));
        }
        features.push(json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [x, y] },
            "properties": properties,
        }));
    }

    json!({
        "type": "FeatureCollection",
        "name": snapshot.layer.table_name(),
        "features": features,
    })
}

pub fn write_feature_collection(snapshot: &ColumnarSnapshotV1, out: &Path) -> Result<usize> {
    let collection = feature_collection(snapshot);
    let count = collection["features"].as_array().map_or(0, Vec::len);
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(&collection)?;
    std::fs::write(out, text).with_context(|| format!("writing {}", out.display()))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use archaeograph_core::{Crs, Layer, Table};

    #[test]
    fn points_use_lon_lat_and_keep_attributes() {
        let mut table = Table::staged(Layer::Sites);
        let width = table.columns.len();
        let lon = table.column_index("Lon").unwrap();
        let lat = table.column_index("Lat").unwrap();
        let mut a = vec![Value::Null; width];
        a[0] = Value::from("S1");
        a[lon] = Value::Float(32.5);
        a[lat] = Value::Float(18.5);
        a[table.column_index("NoOfFeatures").unwrap()] = Value::Float(3.0);
        table.push(a);
        let mut b = vec![Value::Null; width];
        b[0] = Value::from("S2");
        table.push(b);

        let snapshot = ColumnarSnapshotV1::from_table(&table, Crs::DEFAULT_SOURCE);
        let fc = feature_collection(&snapshot);
        let features = fc["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["geometry"]["coordinates"], json!([32.5, 18.5]));
        assert_eq!(features[0]["properties"]["SiteID"], json!("S1"));
        assert_eq!(features[0]["properties"]["NoOfFeatures"], json!(3.0));
        assert!(features[0]["properties"].get("Lon").is_none());

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("map/sites.geojson");
        assert_eq!(write_feature_collection(&snapshot, &out).unwrap(), 1);
        assert!(out.exists());
    }
}
