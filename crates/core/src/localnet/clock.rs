use std::{thread::sleep, time::Duration};

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::Serialize;
use solana_clock::Slot;
use solana_epoch_info::EpochInfo;
use solforge_types::{ClockCommand, ClockEvent, NodeEvent, SLOTS_PER_EPOCH};

/// Logical ledger position. Only ticks and accepted submissions move it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockState {
    pub slot: Slot,
    pub block_height: u64,
    pub transaction_count: u64,
}

impl ClockState {
    /// Resumes after the highest slot already present in the index.
    pub fn resume_from(max_recorded_slot: Option<Slot>, transaction_count: u64) -> Self {
        match max_recorded_slot {
            Some(slot) => Self {
                slot: slot + 1,
                block_height: slot + 1,
                transaction_count,
            },
            None => Self {
                transaction_count,
                ..Self::default()
            },
        }
    }

    pub fn advance(&mut self) {
        self.slot += 1;
        self.block_height += 1;
    }

    pub fn epoch(&self) -> u64 {
        self.slot / SLOTS_PER_EPOCH
    }

    pub fn slot_index(&self) -> u64 {
        self.slot % SLOTS_PER_EPOCH
    }

    pub fn epoch_info(&self) -> EpochInfo {
        EpochInfo {
            epoch: self.epoch(),
            slot_index: self.slot_index(),
            slots_in_epoch: SLOTS_PER_EPOCH,
            absolute_slot: self.slot,
            block_height: self.block_height,
            transaction_count: Some(self.transaction_count),
        }
    }
}

pub fn start_clock_runloop(
    mut slot_time: u64,
    node_events_tx: Option<Sender<NodeEvent>>,
) -> (Receiver<ClockEvent>, Sender<ClockCommand>) {
    let (clock_event_tx, clock_event_rx) = unbounded::<ClockEvent>();
    let (clock_command_tx, clock_command_rx) = unbounded::<ClockCommand>();

    let _handle = hiro_system_kit::thread_named("clock").spawn(move || {
        let mut enabled = true;
        loop {
            match clock_command_rx.try_recv() {
                Ok(ClockCommand::Pause) => {
                    enabled = false;
                    if let Some(ref tx) = node_events_tx {
                        let _ = tx.send(NodeEvent::info("Clock paused"));
                    }
                }
                Ok(ClockCommand::Resume) => {
                    enabled = true;
                    if let Some(ref tx) = node_events_tx {
                        let _ = tx.send(NodeEvent::info("Clock resumed"));
                    }
                }
                Ok(ClockCommand::Toggle) => {
                    enabled = !enabled;
                }
                Ok(ClockCommand::UpdateSlotInterval(updated_slot_time)) => {
                    slot_time = updated_slot_time;
                }
                Err(_e) => {}
            }
            sleep(Duration::from_millis(slot_time));
            if enabled && clock_event_tx.send(ClockEvent::Tick).is_err() {
                break;
            }
        }
    });

    (clock_event_rx, clock_command_tx)
}
