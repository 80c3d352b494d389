// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Contract interfaces consumed by the gateway.
//!
//! Enum-typed fields of the delegation registries are declared as `uint8`;
//! the ABI encoding is identical and the gateway only compares raw values.

use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IAccessPolicy {
        function checkAccess(address user) external view returns (bool access, bool free);
    }
}

sol! {
    #[sol(rpc)]
    interface IERC1155 {
        function balanceOf(address account, uint256 id) external view returns (uint256);
        function balanceOfBatch(address[] accounts, uint256[] ids) external view returns (uint256[]);

        event TransferSingle(address indexed operator, address indexed from, address indexed to, uint256 id, uint256 value);
        event TransferBatch(address indexed operator, address indexed from, address indexed to, uint256[] ids, uint256[] values);
    }
}

sol! {
    #[sol(rpc)]
    interface IDelegateRegistryV2 {
        struct Delegation {
            uint8 type_;
            address to;
            address from;
            bytes32 rights;
            address contract_;
            uint256 tokenId;
            uint256 amount;
        }

        function getIncomingDelegations(address to) external view returns (Delegation[] memory delegations);
    }
}

sol! {
    #[sol(rpc)]
    interface IDelegationRegistryV1 {
        struct DelegationInfo {
            uint8 type_;
            address vault;
            address delegate;
            address contract_;
            uint256 tokenId;
        }

        function getDelegationsByDelegate(address delegate) external view returns (DelegationInfo[] memory info);
    }
}

sol! {
    #[sol(rpc)]
    interface ISessionManager {
        function hasActiveSession(address user) external view returns (bool);
        function openFreeSession(address user) external;
        function closeSession(address user) external;
    }
}

/// delegate.xyz v2 `DelegationType` values.
pub mod v2_type {
    pub const ALL: u8 = 1;
    pub const CONTRACT: u8 = 2;
    pub const ERC1155: u8 = 5;
}

/// delegate.xyz v1 `DelegationType` values.
pub mod v1_type {
    pub const ALL: u8 = 1;
    pub const CONTRACT: u8 = 2;
    pub const TOKEN: u8 = 3;
}
