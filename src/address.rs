// src/address.rs
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid IPv4 address {text:?}")]
    InvalidAddress { text: String },
}

/// An IPv4 address held as a host-order `u32`.
///
/// Text is only ever accepted in strict dotted-decimal form: four octets,
/// each 0-255, nothing before or after.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u32);

impl Address {
    pub const UNSPECIFIED: Address = Address(0);

    pub const fn new(raw: u32) -> Self {
        Address(raw)
    }

    pub const fn to_u32(self) -> u32 {
        self.0
    }

    pub fn parse(text: &str) -> Result<Self, AddressError> {
        text.parse()
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Ipv4Addr::from_str(text)
            .map(Address::from)
            .map_err(|_| AddressError::InvalidAddress {
                text: text.to_string(),
            })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ipv4Addr::from(self.0).fmt(f)
    }
}

impl From<Ipv4Addr> for Address {
    fn from(ip: Ipv4Addr) -> Self {
        Address(u32::from(ip))
    }
}

impl From<Address> for Ipv4Addr {
    fn from(address: Address) -> Self {
        Ipv4Addr::from(address.0)
    }
}

impl From<u32> for Address {
    fn from(raw: u32) -> Self {
        Address(raw)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
