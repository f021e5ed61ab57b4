//! kappa - Kandji Custom App自動登録ツール
//!
//! AutoPkgでビルドしたPKGをKandjiテナントへアップロードし、
//! 既存のCustom Appを照合して作成または更新する。

pub mod api;
pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod matcher;
pub mod models;
pub mod notify;
pub mod pkginfo;
pub mod processor;
