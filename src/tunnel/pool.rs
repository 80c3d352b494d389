// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tunnel address pool.
//!
//! Hands out host addresses from one IPv4 network. The network address, the
//! first host (the gateway's own tunnel address) and the broadcast address
//! are never handed out, so a /24 yields 253 client addresses.
//!
//! Allocation is first-fit starting just after the most recently handed-out
//! offset, wrapping at the end of the range. A released address is therefore
//! not reused immediately unless the pool is otherwise full.

use std::net::Ipv4Addr;
use std::str::FromStr;

/// Offsets below this are the network address and the gateway.
const FIRST_CLIENT_OFFSET: u32 = 2;

const MIN_PREFIX: u8 = 8;
const MAX_PREFIX: u8 = 30;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("invalid tunnel network {0}")]
    InvalidCidr(String),

    #[error("address pool exhausted")]
    Exhausted,

    #[error("{0} is not a client address in this pool")]
    NotInPool(Ipv4Addr),

    #[error("{0} is not allocated")]
    NotAllocated(Ipv4Addr),
}

#[derive(Debug)]
pub struct AddressPool {
    network: u32,
    prefix: u8,
    /// One bit per client slot; slot `i` is offset `FIRST_CLIENT_OFFSET + i`.
    bitmap: Vec<u64>,
    slots: usize,
    used: usize,
    /// Slot handed out most recently.
    cursor: usize,
}

impl AddressPool {
    /// Build a pool from CIDR notation, e.g. `10.8.0.0/24`.
    ///
    /// The prefix must be between /8 and /30 and the address must be the
    /// network address (no host bits set).
    pub fn parse(cidr: &str) -> Result<Self, PoolError> {
        let invalid = || PoolError::InvalidCidr(cidr.to_string());

        let (addr, prefix) = cidr.trim().split_once('/').ok_or_else(invalid)?;
        let addr = Ipv4Addr::from_str(addr).map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        if !(MIN_PREFIX..=MAX_PREFIX).contains(&prefix) {
            return Err(invalid());
        }

        let network = u32::from(addr);
        let host_mask = u32::MAX >> prefix;
        if network & host_mask != 0 {
            return Err(invalid());
        }

        // Total size minus network, gateway and broadcast.
        let slots = (host_mask as usize + 1) - 3;
        Ok(Self {
            network,
            prefix,
            bitmap: vec![0; slots.div_ceil(64)],
            slots,
            used: 0,
            // Start so that the first allocation is slot 0.
            cursor: slots - 1,
        })
    }

    /// The gateway's own address inside the tunnel network.
    pub fn server_address(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network + 1)
    }

    pub fn capacity(&self) -> usize {
        self.slots
    }

    pub fn available(&self) -> usize {
        self.slots - self.used
    }

    /// Whether `addr` is a client address of this pool.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.slot_of(addr).is_some()
    }

    pub fn is_allocated(&self, addr: Ipv4Addr) -> bool {
        self.slot_of(addr).is_some_and(|slot| self.bit(slot))
    }

    /// Take the next free address.
    pub fn allocate(&mut self) -> Result<Ipv4Addr, PoolError> {
        if self.used == self.slots {
            return Err(PoolError::Exhausted);
        }

        for step in 1..=self.slots {
            let slot = (self.cursor + step) % self.slots;
            if !self.bit(slot) {
                self.set_bit(slot, true);
                self.used += 1;
                self.cursor = slot;
                return Ok(self.addr_of(slot));
            }
        }
        Err(PoolError::Exhausted)
    }

    /// Return an address to the pool.
    pub fn release(&mut self, addr: Ipv4Addr) -> Result<(), PoolError> {
        let slot = self.slot_of(addr).ok_or(PoolError::NotInPool(addr))?;
        if !self.bit(slot) {
            return Err(PoolError::NotAllocated(addr));
        }
        self.set_bit(slot, false);
        self.used -= 1;
        Ok(())
    }

    /// Every allocated address, ascending.
    pub fn allocated(&self) -> Vec<Ipv4Addr> {
        (0..self.slots)
            .filter(|slot| self.bit(*slot))
            .map(|slot| self.addr_of(slot))
            .collect()
    }

    fn slot_of(&self, addr: Ipv4Addr) -> Option<usize> {
        let offset = u32::from(addr).checked_sub(self.network)?;
        let slot = offset.checked_sub(FIRST_CLIENT_OFFSET)? as usize;
        (slot < self.slots).then_some(slot)
    }

    fn addr_of(&self, slot: usize) -> Ipv4Addr {
        Ipv4Addr::from(self.network + FIRST_CLIENT_OFFSET + slot as u32)
    }

    fn bit(&self, slot: usize) -> bool {
        self.bitmap[slot / 64] & (1 << (slot % 64)) != 0
    }

    fn set_bit(&mut self, slot: usize, value: bool) {
        let mask = 1u64 << (slot % 64);
        if value {
            self.bitmap[slot / 64] |= mask;
        } else {
            self.bitmap[slot / 64] &= !mask;
        }
    }
}

impl std::fmt::Display for AddressPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", Ipv4Addr::from(self.network), self.prefix)
    }
}
