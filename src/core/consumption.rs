//! The dense arrays that every end-use writes its flows into.
//!
//! Both arrays share the shape `[step, user, end-use, pattern, attribute]`. Flows are in
//! litres per second, so the volume of a cell is its value times the step length.

use crate::simulation_time::SimulationTime;
use ndarray::{s, Array1, Array5, ArrayView1, Axis};
use strum::Display;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum FlowAttribute {
    Raw = 0,
    HotEquivalent = 1,
}

impl FlowAttribute {
    pub const COUNT: usize = 2;

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Address of one user's use of one end-use in one pattern replicate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ArraySlot {
    pub user: usize,
    pub end_use: usize,
    pub pattern: usize,
}

impl ArraySlot {
    pub fn new(user: usize, end_use: usize, pattern: usize) -> Self {
        Self {
            user,
            end_use,
            pattern,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ArrayBoundsError {
    #[error("Interval [{start}, {end}) does not lie within the {horizon} simulated steps")]
    Interval {
        start: usize,
        end: usize,
        horizon: usize,
    },
    #[error("{slot:?} is outside arrays of {users} users, {end_uses} end-uses and {patterns} patterns")]
    Slot {
        slot: ArraySlot,
        users: usize,
        end_uses: usize,
        patterns: usize,
    },
}

#[derive(Clone, Copy, Debug, Error, PartialEq)]
#[error("Discharge was simulated but no discharge array was allocated")]
pub struct DischargeArrayMissing;

#[derive(Clone, Debug)]
pub struct UsageArrays {
    consumption: Array5<f64>,
    discharge: Option<Array5<f64>>,
    time: SimulationTime,
}

impl UsageArrays {
    pub fn new(
        time: SimulationTime,
        users: usize,
        end_uses: usize,
        patterns: usize,
        with_discharge: bool,
    ) -> Self {
        let shape = (
            time.total_steps(),
            users,
            end_uses,
            patterns,
            FlowAttribute::COUNT,
        );

        Self {
            consumption: Array5::zeros(shape),
            discharge: with_discharge.then(|| Array5::zeros(shape)),
            time,
        }
    }

    pub fn time(&self) -> &SimulationTime {
        &self.time
    }

    pub fn horizon(&self) -> usize {
        self.consumption.len_of(Axis(0))
    }

    pub fn users(&self) -> usize {
        self.consumption.len_of(Axis(1))
    }

    pub fn end_uses(&self) -> usize {
        self.consumption.len_of(Axis(2))
    }

    pub fn patterns(&self) -> usize {
        self.consumption.len_of(Axis(3))
    }

    pub fn consumption(&self) -> &Array5<f64> {
        &self.consumption
    }

    pub fn discharge(&self) -> Option<&Array5<f64>> {
        self.discharge.as_ref()
    }

    fn check_slot(&self, slot: ArraySlot) -> Result<(), ArrayBoundsError> {
        if slot.user >= self.users() || slot.end_use >= self.end_uses() || slot.pattern >= self.patterns() {
            return Err(ArrayBoundsError::Slot {
                slot,
                users: self.users(),
                end_uses: self.end_uses(),
                patterns: self.patterns(),
            });
        }
        Ok(())
    }

    fn check_interval(&self, start: usize, end: usize) -> Result<(), ArrayBoundsError> {
        if start >= end || end > self.horizon() {
            return Err(ArrayBoundsError::Interval {
                start,
                end,
                horizon: self.horizon(),
            });
        }
        Ok(())
    }

    /// Add a constant flow over the steps `[start, end)`.
    pub fn accumulate(
        &mut self,
        slot: ArraySlot,
        value: f64,
        start: usize,
        end: usize,
        attribute: FlowAttribute,
    ) -> Result<(), ArrayBoundsError> {
        self.check_slot(slot)?;
        self.check_interval(start, end)?;

        let mut cells = self.consumption.slice_mut(s![
            start..end,
            slot.user,
            slot.end_use,
            slot.pattern,
            attribute.index()
        ]);
        cells += value;

        Ok(())
    }

    /// Add a per-step flow pattern starting at `start`.
    pub fn write_pattern(
        &mut self,
        slot: ArraySlot,
        start: usize,
        values: &[f64],
        attribute: FlowAttribute,
    ) -> Result<(), ArrayBoundsError> {
        if values.is_empty() {
            return Ok(());
        }
        self.check_slot(slot)?;
        self.check_interval(start, start + values.len())?;

        let mut cells = self.consumption.slice_mut(s![
            start..start + values.len(),
            slot.user,
            slot.end_use,
            slot.pattern,
            attribute.index()
        ]);
        cells += &ArrayView1::from(values);

        Ok(())
    }

    /// Write a pattern that may run past the end of `day`, moving the overflow to the
    /// start of the following day. The overflow from the last simulated day goes to the
    /// start of the first.
    pub fn handle_spillover_consumption(
        &mut self,
        slot: ArraySlot,
        start: usize,
        values: &[f64],
        day: usize,
        attribute: FlowAttribute,
    ) -> Result<(), ArrayBoundsError> {
        let end_of_day = self.time.day_offset(day + 1);
        let in_day = values.len().min(end_of_day.saturating_sub(start));
        let (today, overflow) = values.split_at(in_day);
        self.write_pattern(slot, start, today, attribute)?;

        let next_day = (day + 1) % self.time.days();
        let overflow = &overflow[..overflow.len().min(self.time.steps_per_day())];
        self.write_pattern(slot, self.time.day_offset(next_day), overflow, attribute)
    }

    /// Write a pattern scheduled on `day`, deciding what happens to steps past the end of
    /// that day. With spillover they are moved by [`Self::handle_spillover_consumption`].
    /// Without it they continue into the next day, and are cut off at the end of the
    /// simulated horizon.
    pub fn write_day_pattern(
        &mut self,
        slot: ArraySlot,
        start: usize,
        values: &[f64],
        day: usize,
        spillover: bool,
        attribute: FlowAttribute,
    ) -> Result<(), ArrayBoundsError> {
        if spillover {
            return self.handle_spillover_consumption(slot, start, values, day, attribute);
        }
        let available = self.horizon().saturating_sub(start);
        self.write_pattern(slot, start, &values[..values.len().min(available)], attribute)
    }

    pub fn discharge_mut(&mut self) -> Result<&mut Array5<f64>, DischargeArrayMissing> {
        self.discharge.as_mut().ok_or(DischargeArrayMissing)
    }

    /// Set the discharge flow of a single step, replacing whatever was there.
    pub fn assign_discharge(
        &mut self,
        slot: ArraySlot,
        step: usize,
        value: f64,
        attribute: FlowAttribute,
    ) -> Result<(), crate::errors::SimulationError> {
        self.check_slot(slot)?;
        self.check_interval(step, step + 1)?;
        self.discharge_mut()?[[step, slot.user, slot.end_use, slot.pattern, attribute.index()]] =
            value;

        Ok(())
    }

    /// The raw discharge series of one slot.
    pub fn discharge_series(&self, slot: ArraySlot) -> Result<ArrayView1<f64>, DischargeArrayMissing> {
        let discharge = self.discharge.as_ref().ok_or(DischargeArrayMissing)?;
        Ok(discharge.slice(s![
            ..,
            slot.user,
            slot.end_use,
            slot.pattern,
            FlowAttribute::Raw.index()
        ]))
    }

    /// Total flow of the whole house for every step of one pattern replicate.
    pub fn house_pattern(&self, pattern: usize, attribute: FlowAttribute) -> Array1<f64> {
        self.consumption
            .slice(s![.., .., .., pattern, attribute.index()])
            .sum_axis(Axis(2))
            .sum_axis(Axis(1))
    }

    pub fn house_discharge(&self, pattern: usize, attribute: FlowAttribute) -> Option<Array1<f64>> {
        self.discharge.as_ref().map(|discharge| {
            discharge
                .slice(s![.., .., .., pattern, attribute.index()])
                .sum_axis(Axis(2))
                .sum_axis(Axis(1))
        })
    }

    /// Flow of one end-use summed over all users.
    pub fn end_use_series(&self, end_use: usize, pattern: usize, attribute: FlowAttribute) -> Array1<f64> {
        self.consumption
            .slice(s![.., .., end_use, pattern, attribute.index()])
            .sum_axis(Axis(1))
    }

    /// Volume in litres drawn by one end-use in one pattern replicate.
    pub fn end_use_total(&self, end_use: usize, pattern: usize) -> f64 {
        self.end_use_series(end_use, pattern, FlowAttribute::Raw).sum() * self.time.resolution() as f64
    }

    /// Volume in litres drawn through one slot.
    pub fn volume(&self, slot: ArraySlot, attribute: FlowAttribute) -> f64 {
        self.consumption
            .slice(s![.., slot.user, slot.end_use, slot.pattern, attribute.index()])
            .sum()
            * self.time.resolution() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SimulationError;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn arrays() -> UsageArrays {
        UsageArrays::new(SimulationTime::new(2, 60).unwrap(), 2, 3, 1, true)
    }

    #[rstest]
    fn test_shape(arrays: UsageArrays) {
        assert_eq!(arrays.consumption().shape(), &[2_880, 2, 3, 1, 2]);
        assert_eq!(arrays.discharge().unwrap().shape(), &[2_880, 2, 3, 1, 2]);
        assert_eq!(arrays.horizon(), 2_880);
    }

    #[rstest]
    fn test_accumulate_is_additive(mut arrays: UsageArrays) {
        let slot = ArraySlot::new(1, 2, 0);
        arrays.accumulate(slot, 0.1, 10, 20, FlowAttribute::Raw).unwrap();
        arrays.accumulate(slot, 0.05, 15, 25, FlowAttribute::Raw).unwrap();

        let series = arrays.end_use_series(2, 0, FlowAttribute::Raw);
        assert_eq!(series[9], 0.);
        assert_relative_eq!(series[12], 0.1);
        assert_relative_eq!(series[17], 0.15);
        assert_relative_eq!(series[22], 0.05);
        assert_eq!(series[25], 0.);
        assert_relative_eq!(arrays.volume(slot, FlowAttribute::Raw), 0.1 * 600. + 0.05 * 600.);
        assert_eq!(arrays.volume(slot, FlowAttribute::HotEquivalent), 0.);
    }

    #[rstest]
    fn test_out_of_bounds_writes_are_rejected(mut arrays: UsageArrays) {
        let slot = ArraySlot::new(0, 0, 0);
        assert_eq!(
            arrays.accumulate(slot, 1., 2_870, 2_881, FlowAttribute::Raw),
            Err(ArrayBoundsError::Interval {
                start: 2_870,
                end: 2_881,
                horizon: 2_880
            })
        );
        assert!(arrays.accumulate(slot, 1., 5, 5, FlowAttribute::Raw).is_err());
        assert!(matches!(
            arrays.accumulate(ArraySlot::new(2, 0, 0), 1., 0, 1, FlowAttribute::Raw),
            Err(ArrayBoundsError::Slot { .. })
        ));
        assert_eq!(arrays.consumption().sum(), 0.);
    }

    #[rstest]
    fn test_spillover_wraps_to_next_day(mut arrays: UsageArrays) {
        let slot = ArraySlot::new(0, 1, 0);
        arrays
            .handle_spillover_consumption(slot, 1_438, &[1., 2., 3., 4.], 0, FlowAttribute::Raw)
            .unwrap();
        let series = arrays.end_use_series(1, 0, FlowAttribute::Raw);
        assert_eq!(series.slice(s![1_438..1_442]).to_vec(), vec![1., 2., 3., 4.]);
    }

    #[rstest]
    fn test_spillover_on_last_day_wraps_to_first_day(mut arrays: UsageArrays) {
        let slot = ArraySlot::new(0, 1, 0);
        let values = [0.5; 10];
        arrays
            .handle_spillover_consumption(slot, 2_875, &values, 1, FlowAttribute::Raw)
            .unwrap();
        let series = arrays.end_use_series(1, 0, FlowAttribute::Raw);
        assert_eq!(series.slice(s![2_875..]).sum(), 2.5);
        assert_eq!(series.slice(s![0..5]).sum(), 2.5);
        assert_relative_eq!(arrays.end_use_total(1, 0), values.iter().sum::<f64>() * 60.);
    }

    #[rstest]
    fn test_day_pattern_without_spillover(mut arrays: UsageArrays) {
        let slot = ArraySlot::new(0, 0, 0);
        arrays
            .write_day_pattern(slot, 1_438, &[1.; 4], 0, false, FlowAttribute::Raw)
            .unwrap();
        arrays
            .write_day_pattern(slot, 2_878, &[1.; 4], 1, false, FlowAttribute::Raw)
            .unwrap();
        let series = arrays.end_use_series(0, 0, FlowAttribute::Raw);
        assert_eq!(series.slice(s![1_438..1_442]).sum(), 4.);
        assert_eq!(series.slice(s![2_878..]).sum(), 2.);
        assert_eq!(series.slice(s![..2]).sum(), 0.);
    }

    #[rstest]
    fn test_house_pattern_sums_users_and_end_uses(mut arrays: UsageArrays) {
        arrays
            .accumulate(ArraySlot::new(0, 0, 0), 0.1, 0, 2, FlowAttribute::Raw)
            .unwrap();
        arrays
            .accumulate(ArraySlot::new(1, 2, 0), 0.2, 1, 3, FlowAttribute::Raw)
            .unwrap();
        let house = arrays.house_pattern(0, FlowAttribute::Raw);
        assert_relative_eq!(house[0], 0.1);
        assert_relative_eq!(house[1], 0.3);
        assert_relative_eq!(house[2], 0.2);
        assert_eq!(house[3], 0.);
    }

    #[rstest]
    fn test_assign_discharge_replaces_value(mut arrays: UsageArrays) {
        let slot = ArraySlot::new(1, 1, 0);
        arrays.assign_discharge(slot, 7, 0.4, FlowAttribute::Raw).unwrap();
        arrays.assign_discharge(slot, 7, 0.3, FlowAttribute::Raw).unwrap();
        assert_eq!(arrays.discharge_series(slot).unwrap()[7], 0.3);
        assert_eq!(arrays.house_discharge(0, FlowAttribute::Raw).unwrap().sum(), 0.3);
    }

    #[test]
    fn test_discharge_without_array() {
        let mut arrays = UsageArrays::new(SimulationTime::new(1, 60).unwrap(), 1, 1, 1, false);
        assert!(matches!(
            arrays.assign_discharge(ArraySlot::new(0, 0, 0), 0, 1., FlowAttribute::Raw),
            Err(SimulationError::DischargeArrayMissing(DischargeArrayMissing))
        ));
        assert!(arrays.discharge().is_none());
    }
}
