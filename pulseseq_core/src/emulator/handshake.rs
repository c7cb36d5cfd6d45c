//! Lines between a core and its external peers. The core holds `enable`
//! until the peer answers with `ready`.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FprocRequest {
    pub enable: bool,
    pub id: u16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FprocResponse {
    pub ready: bool,
    pub data: u32,
}

impl FprocResponse {
    pub fn ready(data: u32) -> Self {
        Self { ready: true, data }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SyncRequest {
    pub enable: bool,
    pub id: u16,
}
