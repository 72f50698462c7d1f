/// Built-in component library reference used whenever remote retrieval is
/// unavailable.
pub const STATIC_REFERENCE: &str = r"[KPC component reference]
KPC is an enterprise Vue 3 component library. Components are registered globally
and used with the `k-` prefix. Styling is Tailwind utility classes plus the
library's own `.k-*` classes; the primary colour is #2563EB.

- k-button: props `type` (primary | secondary | success | danger | warning),
  `size` (small | default | large), `disabled`, `loading`. Emits `click`.
- k-input: v-model string, props `placeholder`, `clearable`, `disabled`,
  `size`. Emits `change`, `focus`, `blur`.
- k-select / k-option: v-model value, `multiple`, `filterable`, `clearable`.
- k-cascader: v-model array or string, prop `data` as nested
  `{ value, label, children }` nodes, `changeOnSelect`, `clearable`.
- k-card: props `title`, `type` (border | shadow | none); slots `header`,
  default, `footer`.
- k-table: prop `data` (array of rows), `rowKey`, `checkType`
  (checkbox | radio | none); columns via k-table-column with `key`, `title`,
  `width`, `sortable`.
- k-form / k-form-item: `model`, `rules`, `label`, `labelWidth`; call
  `validate()` on the form ref before submit.
- k-dialog: v-model visibility, `title`, `width`; emits `ok`, `cancel`.
- k-pagination: `total`, `limit`, v-model current page; emits `change`.
- k-tabs / k-tab: v-model active value, `type` (default | card | border-card).

Layout guidance: prefer flex and grid utilities, `space-y-*` for vertical
rhythm, `max-w-*` containers centred with `mx-auto`.";
