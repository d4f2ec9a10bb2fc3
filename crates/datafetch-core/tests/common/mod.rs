#![allow(dead_code)]

pub mod job_server;
