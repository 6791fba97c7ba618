/// What a component did with a key: ignored it, swallowed it, or turned it
/// into an event of type `T` for the view that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Not for this component; the view may use the key itself
  NotHandled,
  /// Swallowed, nothing for the view to do
  Handled,
  Event(T),
}
