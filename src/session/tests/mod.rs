/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Tests for the session module.

pub mod assignment;
pub mod lifecycle;
pub mod support;
