#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

fn main() {
    ptitconvert_desktop::app_runtime::run();
}
