//! Folds property reports into complete device states.
//!
//! Two inputs feed the same running map of the five canonical properties:
//! the positional answer to the `get_prop` request sent on connect, and
//! unsolicited `props` pushes. A state is produced only once all five
//! properties are present.
//!
//! Bulbs push a color change as one notification holding `color_mode` plus
//! the fields of the new mode. When such a notification arrives the map
//! restarts from it, so fields of the previous color mode do not linger.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use strum::IntoEnumIterator;

use crate::packet::Property;
use crate::status::DeviceState;
use crate::types::{Color, PowerMode};

#[derive(Debug, Default)]
pub(crate) struct StateAggregator {
    fields: BTreeMap<Property, String>,
}

impl StateAggregator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reset(&mut self) {
        self.fields.clear();
    }

    /// Apply a `get_prop` result, whose values follow [`Property`] order.
    pub(crate) fn apply_result(&mut self, values: &[String]) -> Option<DeviceState> {
        for (property, value) in Property::iter().zip(values) {
            self.fields.insert(property, value.clone());
        }
        self.snapshot()
    }

    /// Apply a `props` push. Keys outside the canonical five are ignored.
    pub(crate) fn apply_props(&mut self, params: &HashMap<String, String>) -> Option<DeviceState> {
        let update: BTreeMap<Property, String> = params
            .iter()
            .filter_map(|(key, value)| {
                Property::from_str(key)
                    .ok()
                    .map(|property| (property, value.clone()))
            })
            .collect();

        let restarts = update.contains_key(&Property::ColorMode)
            && (update.contains_key(&Property::Hue) || update.contains_key(&Property::Ct));
        if restarts {
            self.fields = update;
        } else {
            self.fields.extend(update);
        }
        self.snapshot()
    }

    fn snapshot(&self) -> Option<DeviceState> {
        if self.fields.len() != Property::iter().count() {
            return None;
        }
        let field = |p: Property| self.fields.get(&p).map(String::as_str).unwrap_or_default();

        let enabled = matches!(PowerMode::from_str(field(Property::Power)), Ok(PowerMode::On));
        let color = Color::from_fields(
            field(Property::ColorMode),
            field(Property::Ct),
            field(Property::Hue),
            field(Property::Sat),
        );
        Some(DeviceState::known(enabled, color))
    }
}
