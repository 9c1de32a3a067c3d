/// iced front-end pieces shared by the screens in `main.rs`

pub mod preview;
