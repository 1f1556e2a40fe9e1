// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod dispatch_test;
pub mod helpers;
pub mod proxy_pool_test;
pub mod reconciliation_test;
pub mod scheduler_test;
