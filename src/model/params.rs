//! Print-configuration snapshot feeding the brim heuristics
//!
//! [`PrintParams`] captures the slice of the active print configuration
//! the model layer consumes: per-extruder material data and the global
//! speed table with the usable bed outline. It is rebuilt explicitly via
//! [`set_extruder_params`](PrintParams::set_extruder_params) and
//! [`set_print_speed_table`](PrintParams::set_print_speed_table) whenever
//! the configuration changes; nothing here refreshes itself.

use std::collections::HashMap;

use nalgebra::Point2;

use crate::config::{ConfigValue, ObjectConfig};
use crate::error::Result;
use crate::polygon::{difference, Polygon};

use super::object::ModelObject;

/// Material parameters of one extruder slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtruderParams {
    /// Filament type name (`"PLA"`, `"ABS"`, `"TPU 95A"`, ...)
    pub material_name: String,
    /// Bed temperature for this material
    pub bed_temp: i32,
    /// Nozzle temperature
    pub heat_end_temp: f64,
}

/// Global print speeds plus the usable bed outline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeedTable {
    /// Inner wall speed
    pub perimeter_speed: f64,
    /// Outer wall speed
    pub external_perimeter_speed: f64,
    /// Sparse infill speed
    pub infill_speed: f64,
    /// Internal solid infill speed
    pub solid_infill_speed: f64,
    /// Top surface speed
    pub top_solid_infill_speed: f64,
    /// Support structure speed
    pub support_speed: f64,
    /// Never read from the global config; only object overrides set it
    pub small_perimeter_speed: f64,
    /// Fold of the speeds present in the global config
    pub max_speed: f64,
    /// Bed shape with the exclusion areas carved out
    pub bed_poly: Polygon,
}

/// Derived print parameters consumed by
/// [`ModelInstance::auto_brim_width_with`](super::ModelInstance::auto_brim_width_with)
/// and the thermal-length helpers.
#[derive(Debug, Clone, Default)]
pub struct PrintParams {
    /// Material data per extruder slot; slot 0 mirrors extruder 1 so both
    /// 0-based and 1-based lookups resolve
    pub extruder_params: HashMap<usize, ExtruderParams>,
    /// Global speed table
    pub speed_table: SpeedTable,
}

impl PrintParams {
    /// Empty snapshot; fill it with the `set_*` methods
    pub fn new() -> Self {
        PrintParams::default()
    }

    /// Rebuild the per-extruder material table from the global config.
    ///
    /// Reads the `filament_type` string list and the `nozzle_temperature`
    /// float list; entries missing from either list default to an unnamed
    /// material at 0°. The bed temperature is a flat 35° (per-bed-type
    /// temperatures live outside this snapshot).
    pub fn set_extruder_params(&mut self, global: &ObjectConfig, extruder_count: usize) {
        self.extruder_params.clear();
        let material_names = global
            .get("filament_type")
            .and_then(ConfigValue::as_strings);
        let nozzle_temps = global
            .get("nozzle_temperature")
            .and_then(ConfigValue::as_floats);
        for i in 0..extruder_count {
            let params = ExtruderParams {
                material_name: material_names
                    .and_then(|names| names.get(i))
                    .cloned()
                    .unwrap_or_default(),
                bed_temp: 35,
                heat_end_temp: nozzle_temps
                    .and_then(|temps| temps.get(i))
                    .copied()
                    .unwrap_or(0.0),
            };
            if i == 0 {
                self.extruder_params.insert(0, params.clone());
            }
            self.extruder_params.insert(i + 1, params);
        }
    }

    /// Rebuild the speed table from the global config and carve the
    /// exclusion areas out of the bed outline. Speed keys absent from the
    /// config keep their previous value; `max_speed` is refolded from the
    /// keys that are present.
    pub fn set_print_speed_table(
        &mut self,
        global: &ObjectConfig,
        bed_shape: &[Point2<f64>],
        exclude_areas: &[Polygon],
    ) -> Result<()> {
        fn read(global: &ObjectConfig, key: &str, slot: &mut f64, max: &mut f64) {
            if let Some(v) = global.get(key).and_then(ConfigValue::as_float) {
                *slot = v;
                *max = (*max).max(v);
            }
        }

        let table = &mut self.speed_table;
        table.max_speed = 0.0;
        read(global, "inner_wall_speed", &mut table.perimeter_speed, &mut table.max_speed);
        read(global, "outer_wall_speed", &mut table.external_perimeter_speed, &mut table.max_speed);
        read(global, "sparse_infill_speed", &mut table.infill_speed, &mut table.max_speed);
        read(global, "internal_solid_infill_speed", &mut table.solid_infill_speed, &mut table.max_speed);
        read(global, "top_surface_speed", &mut table.top_solid_infill_speed, &mut table.max_speed);
        read(global, "support_speed", &mut table.support_speed, &mut table.max_speed);

        let bed = Polygon::from_points(bed_shape.to_vec());
        table.bed_poly = difference(&[bed.clone()], exclude_areas)?
            .into_iter()
            .next()
            .unwrap_or(bed);
        Ok(())
    }

    /// Highest speed `object` will print at: its config overrides layered
    /// over the global table. An object with no overrides reports the
    /// global maximum; when nothing positive is configured anywhere the
    /// fallback is 250.
    pub fn find_max_speed(&self, object: &ModelObject) -> f64 {
        let table = &self.speed_table;
        if object.config.is_empty() {
            return table.max_speed;
        }
        let mut perimeter = table.perimeter_speed;
        let mut external_perimeter = table.external_perimeter_speed;
        let mut infill = table.infill_speed;
        let mut solid_infill = table.solid_infill_speed;
        let mut top_solid_infill = table.top_solid_infill_speed;
        let mut support = table.support_speed;
        let mut small_perimeter = table.small_perimeter_speed;
        for (key, value) in object.config.iter() {
            let Some(v) = value.as_float() else { continue };
            match key {
                "inner_wall_speed" => {
                    perimeter = v;
                    // keep the configured outer/inner wall speed ratio
                    external_perimeter =
                        table.external_perimeter_speed / table.perimeter_speed * v;
                }
                "outer_wall_speed" => external_perimeter = v,
                "sparse_infill_speed" => infill = v,
                "internal_solid_infill_speed" => solid_infill = v,
                "top_surface_speed" => top_solid_infill = v,
                "support_speed" => support = v,
                "small_perimeter_speed" => small_perimeter = v,
                _ => {}
            }
        }
        let max = (-1.0_f64)
            .max(perimeter)
            .max(external_perimeter)
            .max(infill)
            .max(solid_infill)
            .max(top_solid_infill)
            .max(support)
            .max(small_perimeter);
        if max <= 0.0 {
            250.0
        } else {
            max
        }
    }

    /// Characteristic thermal length of the material on `extruder`: 100
    /// for ABS and the carbon-filled PA/PET blends, 40 for PC, 1000 for
    /// the TPU family, 200 for everything else (unknown extruders
    /// included).
    pub fn thermal_length(&self, extruder: i32) -> f64 {
        let params = usize::try_from(extruder)
            .ok()
            .and_then(|id| self.extruder_params.get(&id));
        let Some(params) = params else {
            return 200.0;
        };
        match params.material_name.as_str() {
            "ABS" | "PA-CF" | "PET-CF" => 100.0,
            "PC" => 40.0,
            name if name.contains("TPU") => 1000.0,
            _ => 200.0,
        }
    }

    /// Most demanding (smallest) thermal length across the object's
    /// volumes, seeded above any material value
    pub fn thermal_length_of(&self, object: &ModelObject) -> f64 {
        let mut thermal_length: f64 = 1250.0;
        for volume in &object.volumes {
            thermal_length =
                thermal_length.min(self.thermal_length(volume.extruder_id(&object.config)));
        }
        thermal_length
    }

    /// Bed adhesion multiplier from the materials in use: 2 for PETG and
    /// PCTG, 0.5 for TPU, 1 otherwise. Later volumes win.
    pub fn adhesion_coefficient(&self, object: &ModelObject) -> f64 {
        let mut coefficient = 1.0;
        for volume in &object.volumes {
            let Some(params) = usize::try_from(volume.extruder_id(&object.config))
                .ok()
                .and_then(|id| self.extruder_params.get(&id))
            else {
                continue;
            };
            match params.material_name.as_str() {
                "PETG" | "PCTG" => coefficient = 2.0,
                "TPU" => coefficient = 0.5,
                _ => {}
            }
        }
        coefficient
    }

    /// Bed temperature of the first extruder in use that has a non-zero
    /// one configured, 0 when none does
    pub fn max_bed_temperature(&self, object: &ModelObject) -> f64 {
        for volume in &object.volumes {
            let Some(params) = usize::try_from(volume.extruder_id(&object.config))
                .ok()
                .and_then(|id| self.extruder_params.get(&id))
            else {
                continue;
            };
            if params.bed_temp != 0 {
                return f64::from(params.bed_temp);
            }
        }
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::TriangleMesh;

    fn global_config() -> ObjectConfig {
        let mut config = ObjectConfig::new();
        config.set(
            "filament_type",
            ConfigValue::Strings(vec!["PLA".into(), "ABS".into(), "TPU 95A".into()]),
        );
        config.set(
            "nozzle_temperature",
            ConfigValue::Floats(vec![210.0, 240.0, 220.0]),
        );
        config
    }

    #[test]
    fn test_extruder_params_slot_zero_mirrors_first_extruder() {
        let mut params = PrintParams::new();
        params.set_extruder_params(&global_config(), 3);
        assert_eq!(params.extruder_params.len(), 4);
        assert_eq!(params.extruder_params[&0], params.extruder_params[&1]);
        assert_eq!(params.extruder_params[&1].material_name, "PLA");
        assert_eq!(params.extruder_params[&2].material_name, "ABS");
        assert_eq!(params.extruder_params[&2].heat_end_temp, 240.0);
        assert_eq!(params.extruder_params[&3].bed_temp, 35);
    }

    #[test]
    fn test_extruder_params_missing_lists_default() {
        let mut params = PrintParams::new();
        params.set_extruder_params(&ObjectConfig::new(), 2);
        assert_eq!(params.extruder_params[&2].material_name, "");
        assert_eq!(params.extruder_params[&2].heat_end_temp, 0.0);
    }

    #[test]
    fn test_speed_table_folds_max_and_carves_bed() {
        let mut config = ObjectConfig::new();
        config.set("inner_wall_speed", ConfigValue::Float(60.0));
        config.set("outer_wall_speed", ConfigValue::Float(40.0));
        config.set("support_speed", ConfigValue::Float(80.0));

        let bed = [
            Point2::new(0.0, 0.0),
            Point2::new(200.0, 0.0),
            Point2::new(200.0, 200.0),
            Point2::new(0.0, 200.0),
        ];
        let exclude = Polygon::from_points(vec![
            Point2::new(0.0, 0.0),
            Point2::new(50.0, 0.0),
            Point2::new(50.0, 50.0),
            Point2::new(0.0, 50.0),
        ]);

        let mut params = PrintParams::new();
        params
            .set_print_speed_table(&config, &bed, std::slice::from_ref(&exclude))
            .unwrap();
        assert_eq!(params.speed_table.perimeter_speed, 60.0);
        assert_eq!(params.speed_table.max_speed, 80.0);
        assert_eq!(params.speed_table.infill_speed, 0.0);
        let carved = params.speed_table.bed_poly.area().abs();
        assert!((carved - (200.0 * 200.0 - 50.0 * 50.0)).abs() < 1e-6);

        params.set_print_speed_table(&config, &bed, &[]).unwrap();
        let full = params.speed_table.bed_poly.area().abs();
        assert!((full - 200.0 * 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_find_max_speed_layers_object_overrides() {
        let mut global = ObjectConfig::new();
        global.set("inner_wall_speed", ConfigValue::Float(60.0));
        global.set("outer_wall_speed", ConfigValue::Float(30.0));
        global.set("support_speed", ConfigValue::Float(80.0));
        let bed = [
            Point2::new(0.0, 0.0),
            Point2::new(200.0, 0.0),
            Point2::new(200.0, 200.0),
            Point2::new(0.0, 200.0),
        ];
        let mut params = PrintParams::new();
        params.set_print_speed_table(&global, &bed, &[]).unwrap();

        let mut object = ModelObject::new();
        object.add_volume(TriangleMesh::cube(1.0, 1.0, 1.0));
        assert_eq!(params.find_max_speed(&object), 80.0);

        // inner-wall override rescales the outer wall by the global ratio
        object
            .config
            .set("inner_wall_speed", ConfigValue::Float(100.0));
        assert_eq!(params.find_max_speed(&object), 100.0);

        object
            .config
            .set("small_perimeter_speed", ConfigValue::Float(300.0));
        assert_eq!(params.find_max_speed(&object), 300.0);
    }

    #[test]
    fn test_find_max_speed_fallback() {
        let params = PrintParams::new();
        let mut object = ModelObject::new();
        object.config.set("brim_width", ConfigValue::Float(3.0));
        assert_eq!(params.find_max_speed(&object), 250.0);
    }

    #[test]
    fn test_thermal_length_by_material() {
        let mut params = PrintParams::new();
        params.set_extruder_params(&global_config(), 3);
        assert_eq!(params.thermal_length(1), 200.0); // PLA
        assert_eq!(params.thermal_length(2), 100.0); // ABS
        assert_eq!(params.thermal_length(3), 1000.0); // TPU 95A, substring match
        assert_eq!(params.thermal_length(9), 200.0); // unknown extruder
        assert_eq!(params.thermal_length(-1), 200.0);
    }

    #[test]
    fn test_adhesion_coefficient_last_volume_wins() {
        let mut config = ObjectConfig::new();
        config.set(
            "filament_type",
            ConfigValue::Strings(vec!["PETG".into(), "TPU".into()]),
        );
        let mut params = PrintParams::new();
        params.set_extruder_params(&config, 2);

        let mut object = ModelObject::new();
        object.add_volume(TriangleMesh::cube(1.0, 1.0, 1.0));
        object.add_volume(TriangleMesh::cube(1.0, 1.0, 1.0));
        object.volumes[0].config.set("extruder", ConfigValue::Int(1));
        object.volumes[1].config.set("extruder", ConfigValue::Int(2));
        assert_eq!(params.adhesion_coefficient(&object), 0.5);

        object.volumes[1].config.set("extruder", ConfigValue::Int(1));
        assert_eq!(params.adhesion_coefficient(&object), 2.0);
    }

    #[test]
    fn test_max_bed_temperature_first_hit() {
        let mut params = PrintParams::new();
        params.set_extruder_params(&global_config(), 1);
        let mut object = ModelObject::new();
        object.add_volume(TriangleMesh::cube(1.0, 1.0, 1.0));
        assert_eq!(params.max_bed_temperature(&object), 35.0);
        assert_eq!(params.max_bed_temperature(&ModelObject::new()), 0.0);
    }
}
