//! Contexte de rendu GPU de la surface de signalisation.
//!
//! Ce module isole la création du `WindowRenderingContext` (basé sur
//! surfman/OpenGL) et le remplissage de la surface avec la couleur de fond
//! tant que le contenu n'est pas prêt (pas de flash blanc au démarrage).

use std::rc::Rc;

use glow::HasContext;
use servo::{RenderingContext, WindowRenderingContext};
use thiserror::Error;
use winit::dpi::PhysicalSize;
use winit::raw_window_handle::{DisplayHandle, WindowHandle};

#[derive(Debug, Error)]
pub enum RenderingError {
    #[error("cannot create the window rendering context (GPU driver?): {0}")]
    Create(String),
    #[error("cannot make the OpenGL context current: {0}")]
    MakeCurrent(String),
}

/// Crée un contexte de rendu hardware-acceleré lié à la fenêtre Winit.
///
/// Le contexte est rendu courant (`make_current`) avant d'être retourné,
/// ce qui est requis avant de le passer à `WebViewBuilder`.
pub fn create_rendering_context(
    display_handle: DisplayHandle<'_>,
    window_handle: WindowHandle<'_>,
    size: PhysicalSize<u32>,
) -> Result<Rc<WindowRenderingContext>, RenderingError> {
    let rendering_context = WindowRenderingContext::new(display_handle, window_handle, size)
        .map_err(|e| RenderingError::Create(format!("{e:?}")))?;

    rendering_context
        .make_current()
        .map_err(|e| RenderingError::MakeCurrent(format!("{e:?}")))?;

    Ok(Rc::new(rendering_context))
}

/// Remplit toute la surface avec `rgba` et présente le frame.
pub fn fill_background(context: &WindowRenderingContext, rgba: [f32; 4]) {
    context.prepare_for_rendering();
    let gl = context.glow_gl_api();
    let [r, g, b, a] = rgba;
    unsafe {
        gl.clear_color(r, g, b, a);
        gl.clear(glow::COLOR_BUFFER_BIT);
    }
    context.present();
}
