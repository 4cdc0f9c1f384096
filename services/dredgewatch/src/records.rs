//! Typed views of the records each subsystem publishes
//!
//! Feeds carry records as raw JSON. Consumers that want typed access convert
//! a record with [`parse_record`] or fetch one with
//! [`DredgeApi::fetch_subsystem`](crate::api::DredgeApi::fetch_subsystem).
//! Missing fields take their default so a partially populated record still
//! parses.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::Subsystem;

/// A record type published by one subsystem
pub trait SubsystemRecord: DeserializeOwned {
    const SUBSYSTEM: Subsystem;
}

/// Convert a normalized record into its typed form
pub fn parse_record<R: SubsystemRecord>(record: &Value) -> crate::Result<R> {
    Ok(R::deserialize(record)?)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceMetrics {
    pub efficiency_performance_metrics: Vec<f64>,
    pub power_output_trend: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Maintenance {
    pub next_service: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceUpdate {
    pub estimated_completion: String,
}

/// Vessel overview. Sensor readings arrive pre-formatted as strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardRecord {
    pub engine_temperature: String,
    pub engine_rpm: String,
    pub power_output: String,
    pub load_sensor: String,
    pub depth_sensor: String,
    pub overall_health: Vec<f64>,
    pub maintenance: Maintenance,
    pub maintenance_update: MaintenanceUpdate,
    pub performance_metrics: PerformanceMetrics,
}

impl SubsystemRecord for DashboardRecord {
    const SUBSYSTEM: Subsystem = Subsystem::Dashboard;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropulsionOverview {
    pub engine_rpm: f64,
    pub shaft_rpm: f64,
    pub thruster_rpm: f64,
    pub turbocharger_rpm: f64,
    pub thruster_load: f64,
    pub system_health: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureAndPressure {
    pub exhaust_gas_temp: Vec<f64>,
    pub cooling_water_temp: Vec<f64>,
    pub lube_oil_temp: Vec<f64>,
    pub fuel_pressure: Vec<f64>,
    pub lube_oil_pressure: Vec<f64>,
    pub thruster_hyd_pressure: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VibrationAndBearing {
    pub engine_vibration: Vec<f64>,
    pub shaft_bearing_vibration: Vec<f64>,
    pub bearing_temperatures: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpmTrend {
    pub engine_rpm: Vec<f64>,
    pub shaft_rpm: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginePropulsionRecord {
    pub overview: PropulsionOverview,
    pub temperature_and_pressure: TemperatureAndPressure,
    pub vibration_and_bearing: VibrationAndBearing,
    pub trend_analysis: RpmTrend,
}

impl SubsystemRecord for EnginePropulsionRecord {
    const SUBSYSTEM: Subsystem = Subsystem::EnginePropulsion;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipePerformance {
    pub suction_depth: String,
    pub suction_pipe_flow_rate: String,
    pub suction_pipe_pressure: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DragheadAndCutter {
    pub draghead_pressure_and_flow: Vec<f64>,
    pub cutter_torque_and_rpm: Vec<f64>,
    #[serde(rename = "SEABED RESISTANCE")]
    pub seabed_resistance: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoomArmBucketAngles {
    pub arm_angle: String,
    pub boom_angle: String,
    pub bucket_angle: String,
    #[serde(rename = "EXCAVATION_ACTIVITY")]
    pub excavation_activity: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcavationControl {
    pub grab_position: String,
    pub boom_arm_bucket_angles: BoomArmBucketAngles,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuctionTrend {
    pub suction_pressure: Vec<f64>,
    pub flow_rate: Vec<f64>,
    pub cutter_torque: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuctionSystemRecord {
    pub pipe_performance: PipePerformance,
    pub draghead_and_cutter: DragheadAndCutter,
    pub excavation_control: ExcavationControl,
    pub trend_analysis: SuctionTrend,
}

impl SubsystemRecord for SuctionSystemRecord {
    const SUBSYSTEM: Subsystem = Subsystem::SuctionSystem;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemOverview {
    pub engine_health: f64,
    pub suction_efficiency: f64,
    pub dredging_efficiency: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginePropulsionHealth {
    pub thermal_stress_index: f64,
    pub mechanical_efficiency: f64,
    pub cooling_efficiency: f64,
    pub propulsion_alignment: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuctionSystemPerformance {
    pub pressure_fluctuation: f64,
    pub cutter_resistance: f64,
    pub turbidity_to_torque: f64,
    pub flow_stability_factor: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformancePredictiveTrends {
    pub dredging_efficiency: Vec<f64>,
    pub turbidity_efficiency: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemDetailedMetrics {
    pub shaft_rpm: Vec<f64>,
    pub engine_rpm: Vec<f64>,
    pub bearing_temp: Vec<f64>,
    pub pressure: Vec<f64>,
    pub turbidity: Vec<f64>,
    pub cutter_torque: Vec<f64>,
}

/// Health scores, trends and forecasts. Single-series sections are
/// published as one-key objects and flattened here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictiveAnalysisRecord {
    pub system_overview: SystemOverview,
    #[serde(with = "series::engine_health_trend")]
    pub engine_health_trend: Vec<f64>,
    #[serde(with = "series::suction_efficiency_trend")]
    pub suction_efficiency_trend: Vec<f64>,
    #[serde(with = "series::dredging_performance")]
    pub dredging_performance: Vec<f64>,
    pub engine_propulsion_health: EnginePropulsionHealth,
    pub suction_system_performance: SuctionSystemPerformance,
    #[serde(rename = "predictive_maintenance_forecast")]
    #[serde(with = "series::engine_health_score")]
    pub engine_health_forecast: Vec<f64>,
    pub performance_predictive_trends: PerformancePredictiveTrends,
    pub system_detailed_metrics: SystemDetailedMetrics,
}

impl SubsystemRecord for PredictiveAnalysisRecord {
    const SUBSYSTEM: Subsystem = Subsystem::PredictiveAnalysis;
}

/// (De)serializers for `{"<key>": [..]}` sections
mod series {
    macro_rules! keyed_series {
        ($name:ident) => {
            pub mod $name {
                use serde::{Deserialize, Deserializer, Serialize, Serializer};

                #[derive(Serialize, Deserialize)]
                struct Section {
                    #[serde(default)]
                    $name: Vec<f64>,
                }

                pub fn serialize<S: Serializer>(
                    values: &[f64],
                    serializer: S,
                ) -> Result<S::Ok, S::Error> {
                    Section {
                        $name: values.to_vec(),
                    }
                    .serialize(serializer)
                }

                pub fn deserialize<'de, D: Deserializer<'de>>(
                    deserializer: D,
                ) -> Result<Vec<f64>, D::Error> {
                    Ok(Section::deserialize(deserializer)?.$name)
                }
            }
        };
    }

    keyed_series!(engine_health_trend);
    keyed_series!(suction_efficiency_trend);
    keyed_series!(dredging_performance);
    keyed_series!(engine_health_score);
}
