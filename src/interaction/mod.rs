/// Pointer interaction with decorations on the preview
///
/// - `transformable`: move / resize-rotate / snap state machine
/// - `render`: id-keyed node reconciliation and hit testing

pub mod render;
pub mod transformable;
