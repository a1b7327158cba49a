pub mod reset_mgr;
